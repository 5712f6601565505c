// Instance state: named slots of captured values. Each slot holds plain data,
// a reference to a process-wide binding, or an opaque encoded blob, so the
// whole graph can be written out and rebuilt in a fresh process.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::catalog::Catalog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Captured {
    Plain {
        value: Value,
    },
    /// Resolved by name against the catalog at load time.
    Binding {
        name: String,
    },
    Opaque {
        tag: String,
        #[serde(with = "hex_blob")]
        blob: Vec<u8>,
    },
}

impl Captured {
    pub fn plain(value: impl Into<Value>) -> Self {
        Captured::Plain { value: value.into() }
    }

    pub fn binding(name: impl Into<String>) -> Self {
        Captured::Binding { name: name.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Captured::Plain { .. } => "plain",
            Captured::Binding { .. } => "binding",
            Captured::Opaque { .. } => "opaque",
        }
    }
}

mod hex_blob {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blob: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(blob))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// A value with its own byte encoding, stored by tag. Decoding on load needs
/// the tag registered in the [`Catalog`].
pub trait Opaque: Sized + Send + Sync + 'static {
    const TAG: &'static str;

    fn encode(&self) -> anyhow::Result<Vec<u8>>;

    fn decode(blob: &[u8]) -> anyhow::Result<Self>;
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state slot `{0}` is not set")]
    Missing(String),

    #[error("state slot `{key}` holds {found} data, expected {expected}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("state slot `{key}` holds opaque `{found}`, expected `{expected}`")]
    TagMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("binding `{0}` is not registered")]
    UnknownBinding(String),

    #[error("state slot `{key}`: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state slot `{key}`: {reason}")]
    Codec { key: String, reason: String },
}

#[derive(Debug, Default)]
pub struct StateGraph {
    slots: RwLock<BTreeMap<String, Captured>>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: BTreeMap<String, Captured>) -> Self {
        Self {
            slots: RwLock::new(slots),
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(|source| StateError::Serde {
            key: key.to_string(),
            source,
        })?;
        self.slots.write().insert(key.to_string(), Captured::Plain { value });
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        let slots = self.slots.read();
        match slots.get(key) {
            None => Ok(None),
            Some(Captured::Plain { value }) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StateError::Serde {
                    key: key.to_string(),
                    source,
                }),
            Some(other) => Err(StateError::KindMismatch {
                key: key.to_string(),
                expected: "plain",
                found: other.kind(),
            }),
        }
    }

    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        self.get(key)?.ok_or_else(|| StateError::Missing(key.to_string()))
    }

    /// Read-modify-write of a plain slot under the write lock. A missing slot
    /// starts from `T::default()`.
    pub fn update<T, R, F>(&self, key: &str, f: F) -> Result<R, StateError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let serde_err = |source| StateError::Serde {
            key: key.to_string(),
            source,
        };
        let mut slots = self.slots.write();
        let mut current: T = match slots.get(key) {
            None => T::default(),
            Some(Captured::Plain { value }) => serde_json::from_value(value.clone()).map_err(serde_err)?,
            Some(other) => {
                return Err(StateError::KindMismatch {
                    key: key.to_string(),
                    expected: "plain",
                    found: other.kind(),
                })
            }
        };
        let out = f(&mut current);
        let value = serde_json::to_value(&current).map_err(serde_err)?;
        slots.insert(key.to_string(), Captured::Plain { value });
        Ok(out)
    }

    /// Stores a reference to the catalog binding `binding`.
    pub fn bind(&self, key: &str, binding: &str) {
        self.slots
            .write()
            .insert(key.to_string(), Captured::binding(binding));
    }

    pub fn binding<T: Any + Send + Sync>(&self, key: &str, catalog: &Catalog) -> Result<Arc<T>, StateError> {
        let name = match self.slots.read().get(key) {
            None => return Err(StateError::Missing(key.to_string())),
            Some(Captured::Binding { name }) => name.clone(),
            Some(other) => {
                return Err(StateError::KindMismatch {
                    key: key.to_string(),
                    expected: "binding",
                    found: other.kind(),
                })
            }
        };
        catalog.binding::<T>(&name).ok_or(StateError::UnknownBinding(name))
    }

    pub fn put_opaque<T: Opaque>(&self, key: &str, value: &T) -> Result<(), StateError> {
        let blob = value.encode().map_err(|e| StateError::Codec {
            key: key.to_string(),
            reason: format!("{e:#}"),
        })?;
        self.slots.write().insert(
            key.to_string(),
            Captured::Opaque {
                tag: T::TAG.to_string(),
                blob,
            },
        );
        Ok(())
    }

    pub fn opaque<T: Opaque>(&self, key: &str) -> Result<Option<T>, StateError> {
        let slots = self.slots.read();
        match slots.get(key) {
            None => Ok(None),
            Some(Captured::Opaque { tag, blob }) if tag == T::TAG => T::decode(blob)
                .map(Some)
                .map_err(|e| StateError::Codec {
                    key: key.to_string(),
                    reason: format!("{e:#}"),
                }),
            Some(Captured::Opaque { tag, .. }) => Err(StateError::TagMismatch {
                key: key.to_string(),
                expected: T::TAG.to_string(),
                found: tag.clone(),
            }),
            Some(other) => Err(StateError::KindMismatch {
                key: key.to_string(),
                expected: "opaque",
                found: other.kind(),
            }),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Captured> {
        self.slots.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Captured> {
        self.slots.read().clone()
    }

    pub fn restore(&self, slots: BTreeMap<String, Captured>) {
        *self.slots.write() = slots;
    }
}
