//! Port configuration.
//!
//! Ports rendezvous through socket files in a runtime directory shared by
//! every participating process. Segment options live next to the segments
//! in [`memory::SegmentOptions`](crate::memory::SegmentOptions).

use crate::handle::ResourceName;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default runtime directory.
pub const RUNTIME_DIR_ENV: &str = "SHMPORT_RUNTIME_DIR";

/// File extension of port registrations.
pub const PORT_FILE_EXTENSION: &str = "port";

/// Configuration for port endpoints.
///
/// # Example
///
/// ```rust,ignore
/// use shmport::config::PortConfig;
/// use shmport::port::PortReceiver;
///
/// let config = PortConfig::default().with_runtime_dir("/run/myapp");
/// let receiver = PortReceiver::initialize_in(&config, "svc.port")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Directory holding port registrations.
    pub runtime_dir: PathBuf,
    /// Whether a receiver may take over a registration left behind by a
    /// receiver that died without closing.
    pub reclaim_stale: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            reclaim_stale: true,
        }
    }
}

impl PortConfig {
    /// Configuration rooted at `runtime_dir`.
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            reclaim_stale: true,
        }
    }

    /// Set the runtime directory.
    pub fn with_runtime_dir(mut self, runtime_dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = runtime_dir.into();
        self
    }

    /// Enable or disable stale registration reclaim.
    pub fn with_reclaim_stale(mut self, reclaim: bool) -> Self {
        self.reclaim_stale = reclaim;
        self
    }

    /// Path of the registration for `name`.
    pub fn socket_path(&self, name: &ResourceName) -> PathBuf {
        self.runtime_dir
            .join(format!("{}.{}", name.bare(), PORT_FILE_EXTENSION))
    }

    /// The runtime directory.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }
}

/// `$SHMPORT_RUNTIME_DIR`, else `$XDG_RUNTIME_DIR/shmport`, else
/// `<temp dir>/shmport`.
pub fn default_runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join("shmport");
    }
    std::env::temp_dir().join("shmport")
}
