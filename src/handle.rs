//! Handle tokens and resource names.
//!
//! Segments and ports are plain owned values; a [`HandleId`] is the small
//! fixed-size token each of them carries so that log lines and `Debug`
//! output can tell two handles to the same named resource apart.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum length of a segment or port name, in bytes.
pub const MAX_NAME_LEN: usize = 32;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an open segment or port.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Allocate the next identifier. Identifiers are never reused.
    pub(crate) fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A validated name used by two processes to rendezvous on a resource.
///
/// Names are 1..=[`MAX_NAME_LEN`] bytes (measured as written, including an
/// optional leading `/`), contain no NUL byte and no `/` after the first
/// position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName {
    raw: String,
}

impl ResourceName {
    /// Validate a name. No system call is made.
    pub fn new(name: &str) -> Result<Self> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong {
                name: name.to_string(),
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        let bare = name.strip_prefix('/').unwrap_or(name);
        let reason = if bare.is_empty() {
            Some("name is empty")
        } else if bare.contains('\0') {
            Some("name contains a NUL byte")
        } else if bare.contains('/') {
            Some("name contains '/'")
        } else if bare == "." || bare == ".." {
            Some("name is a path component")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason,
            });
        }

        Ok(Self {
            raw: name.to_string(),
        })
    }

    /// The name exactly as the caller supplied it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The name without its leading `/`.
    pub fn bare(&self) -> &str {
        self.raw.strip_prefix('/').unwrap_or(&self.raw)
    }

    /// The name in POSIX shm form (always with a leading `/`).
    pub fn shm_path(&self) -> String {
        format!("/{}", self.bare())
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for ResourceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
