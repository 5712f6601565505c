// Process-wide append-only log file sink with scoped suspension.
//
// The sink plugs into tracing-subscriber as a writer. While at least one
// `SuspendGuard` is alive the file handle is closed and writes are dropped;
// dropping the last guard reopens the file in append mode.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(Default)]
struct Sink {
    path: Option<PathBuf>,
    file: Option<File>,
    suspended: usize,
}

#[derive(Default)]
pub struct LogFile {
    sink: Mutex<Sink>,
}

static GLOBAL: Lazy<LogFile> = Lazy::new(LogFile::default);

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl LogFile {
    /// Directs the sink to `path`.
    pub fn open(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref().to_path_buf();
        let mut sink = self.sink.lock();
        sink.file = if sink.suspended == 0 {
            Some(open_append(&path)?)
        } else {
            None
        };
        sink.path = Some(path);
        Ok(())
    }

    pub fn close(&self) {
        let mut sink = self.sink.lock();
        if let Some(mut file) = sink.file.take() {
            let _ = file.flush();
        }
        sink.path = None;
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().file.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.sink.lock().suspended > 0
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.sink.lock().path.clone()
    }

    /// Closes the file until the returned guard, and every other live
    /// guard, is dropped.
    pub fn suspend(&self) -> SuspendGuard<'_> {
        let mut sink = self.sink.lock();
        sink.suspended += 1;
        if let Some(mut file) = sink.file.take() {
            let _ = file.flush();
        }
        SuspendGuard { owner: self }
    }

    fn resume(&self) {
        let mut sink = self.sink.lock();
        sink.suspended = sink.suspended.saturating_sub(1);
        if sink.suspended > 0 || sink.file.is_some() {
            return;
        }
        if let Some(path) = sink.path.clone() {
            match open_append(&path) {
                Ok(file) => sink.file = Some(file),
                Err(e) => eprintln!("logfile: cannot reopen {}: {e}", path.display()),
            }
        }
    }
}

impl Write for &LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.lock().file.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[must_use = "logging resumes as soon as the guard is dropped"]
pub struct SuspendGuard<'a> {
    owner: &'a LogFile,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.owner.resume();
    }
}

pub fn global() -> &'static LogFile {
    &GLOBAL
}

pub fn open(path: impl AsRef<Path>) -> io::Result<()> {
    GLOBAL.open(path)
}

/// Suspends the process-wide sink for the lifetime of the guard.
pub fn suspend() -> SuspendGuard<'static> {
    GLOBAL.suspend()
}

/// Writer handed to `tracing_subscriber::fmt::layer().with_writer(..)`.
pub fn writer() -> &'static LogFile {
    &GLOBAL
}
