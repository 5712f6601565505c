// tar.gz member I/O. Entry modes are written explicitly and read back so
// bundled files keep their permission bits.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::codec::CodecError;

pub(crate) struct ArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        let mut builder = tar::Builder::new(GzEncoder::new(inner, Compression::default()));
        builder.mode(tar::HeaderMode::Complete);
        Self { builder }
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8], mode: u32) -> io::Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder.append_data(&mut header, name, data)
    }

    /// Adds a file, or a directory tree recursively, under `name`. Returns
    /// the archive names of the files written.
    pub fn add_path(&mut self, name: &str, source: &Path) -> io::Result<Vec<String>> {
        let meta = fs::metadata(source)?;
        if meta.is_file() {
            let mut file = fs::File::open(source)?;
            self.builder.append_file(name, &mut file)?;
            return Ok(vec![name.to_string()]);
        }

        let mut written = Vec::new();
        let mut entries: Vec<_> = fs::read_dir(source)?.collect::<io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let child = format!("{}/{}", name.trim_end_matches('/'), entry.file_name().to_string_lossy());
            written.extend(self.add_path(&child, &entry.path())?);
        }
        Ok(written)
    }

    pub fn finish(self) -> io::Result<W> {
        self.builder.into_inner()?.finish()
    }
}

pub(crate) struct ArchiveEntry {
    pub data: Vec<u8>,
    pub mode: u32,
}

/// All regular-file members of an archive, read eagerly.
pub(crate) struct ArchiveReader {
    entries: BTreeMap<String, ArchiveEntry>,
}

impl ArchiveReader {
    pub fn read<R: Read>(inner: R) -> Result<Self, CodecError> {
        let corrupt = |e: io::Error| CodecError::Corrupt(e.to_string());
        let mut archive = tar::Archive::new(GzDecoder::new(inner));
        let mut entries = BTreeMap::new();

        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path().map_err(corrupt)?.to_string_lossy().into_owned();
            let mode = entry.header().mode().map_err(corrupt)?;
            // The header size is untrusted; the buffer grows with what is
            // actually read.
            let declared = entry.size();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(corrupt)?;
            if data.len() as u64 != declared {
                return Err(CodecError::Corrupt(format!(
                    "member `{name}` is truncated: {} of {declared} bytes",
                    data.len()
                )));
            }
            entries.insert(name, ArchiveEntry { data, mode });
        }

        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.get(name)
    }

    /// Members under `prefix/`, with the prefix stripped.
    pub fn under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a ArchiveEntry)> + 'a {
        self.entries.iter().filter_map(move |(name, entry)| {
            name.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| (rest, entry))
        })
    }
}

/// Writes `entry` to `dest/rel`, restoring its mode. Refuses paths that
/// would escape `dest`.
pub(crate) fn extract_entry(dest: &Path, rel: &str, entry: &ArchiveEntry) -> Result<PathBuf, CodecError> {
    let rel_path = Path::new(rel);
    if !rel_path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(CodecError::Corrupt(format!("member `{rel}` escapes the extraction root")));
    }
    let target = dest.join(rel_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, &entry.data)?;
    set_mode(&target, entry.mode)?;
    Ok(target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
