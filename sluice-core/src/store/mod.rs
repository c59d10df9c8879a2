//! Response storage used by the caching layer.

use std::collections::BTreeMap;
use std::io::Read;

use bytes::{Buf, Bytes};

pub mod memory;

/// Header-like metadata stored next to a response body.
pub type Info = BTreeMap<String, String>;

/// An entry read back from a [`Store`].
///
/// The content is an immutable snapshot: later writes or evictions of the
/// same key never change what a reader already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    /// Metadata recorded with the content.
    pub info: Info,
    /// The stored bytes.
    pub content: Bytes,
}

impl Stored {
    /// A reader over the stored bytes.
    pub fn reader(&self) -> impl Read {
        self.content.clone().reader()
    }
}

/// Keyed storage for response bodies.
///
/// Implementations serialize concurrent calls internally and never report
/// errors: an entry that cannot be written is simply absent afterwards, and an
/// entry that cannot be read is reported as absent.
pub trait Store: Send + Sync {
    /// Stores `content` with its `info` under `key`, replacing any previous
    /// entry. Oversized content is silently dropped.
    fn set(&self, key: &str, info: Info, content: Bytes);

    /// Reads the entry stored under `key`.
    fn get(&self, key: &str) -> Option<Stored>;

    /// Removes the entry stored under `key`, if any.
    fn delete(&self, key: &str);
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn set(&self, key: &str, info: Info, content: Bytes) {
        (**self).set(key, info, content)
    }

    fn get(&self, key: &str) -> Option<Stored> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) {
        (**self).delete(key)
    }
}
