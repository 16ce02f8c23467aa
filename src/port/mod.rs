//! Named message ports.
//!
//! A port carries discrete typed messages between processes on the same
//! host. A [`PortReceiver`] registers a name; any number of [`PortSender`]s
//! look that name up and send [`Message`]s to it.
//!
//! # Example
//!
//! ```rust,no_run
//! use shmport::config::PortConfig;
//! use shmport::port::{PortReceiver, PortSender, Timeout};
//!
//! let config = PortConfig::new("/tmp/shmport-demo");
//! let mut receiver = PortReceiver::initialize_in(&config, "svc.port")?;
//! let sender = PortSender::initialize_in(&config, "svc.port")?;
//!
//! sender.send(1, b"ping", Timeout::from_millis(1000))?;
//! let msg = receiver.receive(Timeout::from_millis(1000))?;
//! assert_eq!(msg.content(), b"ping");
//! # Ok::<(), shmport::Error>(())
//! ```

#[cfg(feature = "async")]
mod async_port;
mod endpoint;
mod message;
mod timeout;

#[cfg(feature = "async")]
pub use async_port::{AsyncPortReceiver, AsyncPortSender};
pub use endpoint::{PortReceiver, PortSender};
pub use message::{MAX_CONTENT_LEN, MAX_MESSAGE_LEN, MESSAGE_HEADER_LEN, Message};
pub use timeout::Timeout;
