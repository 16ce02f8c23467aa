//! # shmport
//!
//! Named shared memory segments and typed message ports for processes on
//! the same host.
//!
//! shmport gives a process two independent primitives:
//!
//! - **Shared segments**: a named POSIX shared memory object mapped into the
//!   address space. One process creates it, others open it by name, and all
//!   of them read and write the same bytes.
//! - **Message ports**: a named endpoint carrying discrete messages, each a
//!   small integer type plus up to [`MAX_CONTENT_LEN`] bytes of content,
//!   with bounded-time send and receive.
//!
//! Handles are owned values: closing consumes them, so nothing can be used
//! after release.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shmport::prelude::*;
//!
//! // Process A
//! let mut seg = SharedSegment::create("seg1", PageAccess::ReadWrite, FileMode::OWNER_RW, 1024)?;
//! seg.write_payload(Payload::utf8("hello"))?;
//!
//! let mut rx = PortReceiver::initialize("svc.port")?;
//! let msg = rx.receive(Timeout::from_millis(1000))?;
//! println!("type {}: {}", msg.msg_type(), msg.text(Encoding::Utf8));
//!
//! // Process B
//! let peer = SharedSegment::open("seg1", PageAccess::ReadOnly, FileMode::OWNER_RW, 1024)?;
//! assert_eq!(peer.read_text(Encoding::Utf8, None)?, "hello");
//!
//! let tx = PortSender::initialize("svc.port")?;
//! tx.send(1, b"ping", Timeout::from_millis(1000))?;
//! # Ok::<(), shmport::Error>(())
//! ```
//!
//! ## Features
//!
//! - `async`: [`AsyncPortSender`](port::AsyncPortSender) and
//!   [`AsyncPortReceiver`](port::AsyncPortReceiver) running the blocking
//!   calls on tokio's blocking pool.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod observability;
pub mod port;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::codec::{Encoding, Payload};
    pub use crate::config::PortConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::memory::{FileMapAccess, FileMode, PageAccess, SegmentOptions, SharedSegment};
    pub use crate::port::{Message, PortReceiver, PortSender, Timeout};
}

pub use codec::{Encoding, Payload};
pub use error::{Error, ErrorKind, Result};
pub use handle::{HandleId, MAX_NAME_LEN, ResourceName};
pub use memory::SharedSegment;
pub use port::{MAX_CONTENT_LEN, Message, PortReceiver, PortSender, Timeout};
