//! Error types for shmport.
//!
//! Every failure falls into one of four classes (see [`ErrorKind`]):
//! validation errors detected before any system call, resource errors
//! reported by the OS (with the raw `errno` preserved), timeouts, and
//! capacity errors caused by mis-sized transfers.

use rustix::io::Errno;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using shmport's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before touching the OS (bad name, oversized message, ...).
    Validation,
    /// The OS failed to create, open, map, send, receive or release.
    Resource,
    /// A blocking operation did not complete in time.
    Timeout,
    /// A transfer did not fit the segment.
    Capacity,
}

/// Operation that hit a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Sending a message.
    Send,
    /// Receiving a message.
    Receive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

/// Main error type for shmport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Segment or port name exceeds [`MAX_NAME_LEN`](crate::MAX_NAME_LEN).
    #[error("name '{name}' is {len} bytes (max: {max})")]
    NameTooLong {
        /// The rejected name.
        name: String,
        /// Its length in bytes.
        len: usize,
        /// The limit.
        max: usize,
    },

    /// Name is empty or contains characters the OS cannot accept.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A segment must have at least one byte.
    #[error("segment capacity must be greater than 0")]
    ZeroCapacity,

    /// Message content exceeds [`MAX_CONTENT_LEN`](crate::MAX_CONTENT_LEN).
    #[error("message content too large: {size} bytes (max: {max})")]
    ContentTooLarge {
        /// Content length.
        size: usize,
        /// The limit.
        max: usize,
    },

    /// Requested transfer (or open size) is larger than the segment.
    #[error("data size ({requested}) exceeded shared memory capacity ({capacity})")]
    CapacityExceeded {
        /// Bytes requested.
        requested: usize,
        /// Bytes available.
        capacity: usize,
    },

    /// Write attempted through a read-only mapping.
    #[error("segment '{name}' is mapped read-only")]
    ReadOnlySegment {
        /// Segment name.
        name: String,
    },

    /// Unknown text encoding name.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Creating (or sizing) a new shared memory object failed.
    #[error("could not create shared memory object '{name}': {errno}")]
    CreateFailed {
        /// Segment name.
        name: String,
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// Opening an existing shared memory object failed.
    #[error("could not open shared memory object '{name}': {errno}")]
    OpenFailed {
        /// Segment name.
        name: String,
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// The object exists but mapping a view of it failed.
    #[error("could not map view of '{name}': {errno}")]
    MapFailed {
        /// Segment name.
        name: String,
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// Registering or looking up a port endpoint failed.
    #[error("could not initialize port '{name}': {errno}")]
    InitFailed {
        /// Endpoint name.
        name: String,
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// The blocking operation did not complete within its timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Which operation timed out.
        operation: Operation,
        /// The timeout that elapsed, if it was bounded.
        after: Option<Duration>,
    },

    /// Sending failed for a reason other than a timeout.
    #[error("send failed: {errno}")]
    SendFailed {
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// An incoming datagram is larger than the maximum message envelope.
    #[error("receive buffer too small: message is larger than {max} bytes")]
    BufferTooSmall {
        /// Largest envelope this side accepts.
        max: usize,
    },

    /// Receiving failed for a reason other than a timeout.
    #[error("receive failed: {errno}")]
    ReceiveFailed {
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// Releasing a segment or port reported an error.
    #[error("close failed: {errno}")]
    CloseFailed {
        /// OS status.
        #[source]
        errno: Errno,
    },

    /// The blocking task backing an async call panicked or was cancelled.
    #[cfg(feature = "async")]
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NameTooLong { .. }
            | Self::InvalidName { .. }
            | Self::ZeroCapacity
            | Self::ContentTooLarge { .. }
            | Self::ReadOnlySegment { .. }
            | Self::UnsupportedEncoding(_) => ErrorKind::Validation,
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CreateFailed { .. }
            | Self::OpenFailed { .. }
            | Self::MapFailed { .. }
            | Self::InitFailed { .. }
            | Self::SendFailed { .. }
            | Self::BufferTooSmall { .. }
            | Self::ReceiveFailed { .. }
            | Self::CloseFailed { .. } => ErrorKind::Resource,
            #[cfg(feature = "async")]
            Self::Join(_) => ErrorKind::Resource,
        }
    }

    /// Returns true for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The OS status carried by resource errors.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::CreateFailed { errno, .. }
            | Self::OpenFailed { errno, .. }
            | Self::MapFailed { errno, .. }
            | Self::InitFailed { errno, .. }
            | Self::SendFailed { errno }
            | Self::ReceiveFailed { errno }
            | Self::CloseFailed { errno } => Some(*errno),
            _ => None,
        }
    }

    /// The raw OS status code carried by resource errors.
    pub fn os_code(&self) -> Option<i32> {
        self.errno().map(Errno::raw_os_error)
    }
}

/// Convert a socket-layer I/O error into an `Errno`.
pub(crate) fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_io_error(err).unwrap_or(Errno::IO)
}
