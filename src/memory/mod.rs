//! Shared memory management.
//!
//! Named segments let independent processes exchange bulk data: the first
//! process [creates](SharedSegment::create) a segment, the others
//! [open](SharedSegment::open) it under the same name.
//!
//! # Architecture
//!
//! - [`SharedSegment`]: owned handle to a mapped `shm_open` object
//! - [`PageAccess`], [`FileMapAccess`], [`FileMode`]: the raw access and
//!   permission values peers agree on
//! - [`SegmentOptions`]: collision and unlink policies
//!
//! The segment does not order writes against concurrent readers in other
//! processes. Pair it with a [port](crate::port) message as a ready signal.
//!
//! # Example
//!
//! ```rust,no_run
//! use shmport::memory::{FileMode, PageAccess, SharedSegment};
//!
//! let mut seg = SharedSegment::create("frames", PageAccess::ReadWrite, FileMode::OWNER_RW, 64 * 1024)?;
//! seg.write(&[1, 2, 3])?;
//! seg.close()?;
//! # Ok::<(), shmport::Error>(())
//! ```

mod segment;
mod shared;

pub use segment::{ExistsPolicy, FileMapAccess, FileMode, PageAccess, SegmentOptions, UnlinkPolicy};
pub use shared::SharedSegment;
