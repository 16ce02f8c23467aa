//! Sender and receiver endpoints.
//!
//! A receiver registers a name by binding a datagram socket at
//! `<runtime_dir>/<name>.port`; a sender looks the name up by connecting to
//! that socket. The role is fixed by the type: a [`PortSender`] can only
//! send and a [`PortReceiver`] can only receive.

use super::message::{MAX_MESSAGE_LEN, Message, check_content_len};
use super::timeout::{Direction, Failure, Timeout, run_with_timeout};
use crate::codec::Payload;
use crate::config::PortConfig;
use crate::error::{Error, Operation, Result, errno_of};
use crate::handle::{HandleId, ResourceName};
use crate::observability::{span_port, trace_payload};
use rustix::io::Errno;
use std::net::Shutdown;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

/// Capacity of `sockaddr_un.sun_path`, including the terminating NUL.
const SUN_PATH_LEN: usize = 108;

fn init_failed(name: &ResourceName, errno: Errno) -> Error {
    Error::InitFailed {
        name: name.to_string(),
        errno,
    }
}

fn registration_path(config: &PortConfig, name: &ResourceName) -> Result<PathBuf> {
    let path = config.socket_path(name);
    if path.as_os_str().as_bytes().len() >= SUN_PATH_LEN {
        return Err(init_failed(name, Errno::NAMETOOLONG));
    }
    Ok(path)
}

/// A registration is stale when its file exists but nobody is bound to it.
fn is_stale(path: &Path) -> bool {
    match UnixDatagram::unbound().and_then(|probe| probe.connect(path)) {
        Ok(()) => false,
        Err(e) => errno_of(&e) == Errno::CONNREFUSED,
    }
}

/// Send side of a port.
///
/// # Example
///
/// ```rust,no_run
/// use shmport::port::{PortSender, Timeout};
///
/// let sender = PortSender::initialize("svc.port")?;
/// sender.send(1, b"ping", Timeout::from_millis(1000))?;
/// sender.close()?;
/// # Ok::<(), shmport::Error>(())
/// ```
pub struct PortSender {
    id: HandleId,
    name: ResourceName,
    socket: UnixDatagram,
}

impl PortSender {
    /// Look up `name` in the default runtime directory.
    pub fn initialize(name: &str) -> Result<Self> {
        Self::initialize_in(&PortConfig::default(), name)
    }

    /// Look up `name` in `config`'s runtime directory.
    ///
    /// # Errors
    ///
    /// - `NameTooLong` / `InvalidName` before any system call.
    /// - `InitFailed` if no receiver is registered under `name`
    ///   (`ENOENT`, `ECONNREFUSED`) or the lookup is denied.
    pub fn initialize_in(config: &PortConfig, name: &str) -> Result<Self> {
        let name = ResourceName::new(name)?;
        let _span = span_port("initialize", name.as_str(), "sender").entered();
        let path = registration_path(config, &name)?;

        let socket = UnixDatagram::unbound().map_err(|e| init_failed(&name, errno_of(&e)))?;
        socket
            .connect(&path)
            .map_err(|e| init_failed(&name, errno_of(&e)))?;

        tracing::debug!(name = %name, path = %path.display(), "sender connected");

        Ok(Self {
            id: HandleId::next(),
            name,
            socket,
        })
    }

    /// Handle token.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Send one message.
    ///
    /// Returning `Ok` means the kernel queued the message, not that the
    /// receiver has read it.
    ///
    /// # Errors
    ///
    /// - `ContentTooLarge` before any system call; nothing is sent.
    /// - `Timeout` if the receiver's queue stays full past `timeout`.
    /// - `SendFailed` otherwise (e.g. `ECONNREFUSED` once the receiver is
    ///   gone).
    pub fn send(&self, msg_type: i32, content: &[u8], timeout: Timeout) -> Result<()> {
        check_content_len(content.len())?;

        let _span = span_port("send", self.name.as_str(), "sender").entered();
        let mut frame = Vec::new();
        Message::encode_into(msg_type, content, &mut frame);

        let sent = run_with_timeout(&self.socket, timeout, Direction::Send, |s| s.send(&frame))
            .map_err(|failure| match failure {
                Failure::TimedOut => {
                    tracing::trace!(name = %self.name, ?timeout, "send timed out");
                    Error::Timeout {
                        operation: Operation::Send,
                        after: timeout.duration(),
                    }
                }
                Failure::Os(errno) => Error::SendFailed { errno },
            })?;

        if sent != frame.len() {
            return Err(Error::SendFailed {
                errno: Errno::MSGSIZE,
            });
        }

        trace_payload("port send", self.name.as_str(), content.len());
        Ok(())
    }

    /// Coerce `payload` to bytes and send it.
    pub fn send_payload(&self, msg_type: i32, payload: Payload<'_>, timeout: Timeout) -> Result<()> {
        check_content_len(payload.encoded_len())?;
        self.send(msg_type, &payload.to_bytes(), timeout)
    }

    /// Send a prebuilt message.
    pub fn send_message(&self, message: &Message, timeout: Timeout) -> Result<()> {
        self.send(message.msg_type(), message.content(), timeout)
    }

    /// Release the endpoint.
    ///
    /// # Errors
    ///
    /// `CloseFailed` if shutting the connection down fails for a reason
    /// other than the receiver already being gone.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    /// Shut the connection down in place. Later sends fail with
    /// `SendFailed(EPIPE)`.
    pub(crate) fn shutdown(&self) -> Result<()> {
        let result = match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) => match errno_of(&e) {
                Errno::NOTCONN | Errno::CONNREFUSED => Ok(()),
                errno => Err(Error::CloseFailed { errno }),
            },
        };
        tracing::debug!(name = %self.name, id = %self.id, "sender closed");
        result
    }
}

impl std::fmt::Debug for PortSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSender")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .finish()
    }
}

/// Receive side of a port.
///
/// Owns the name registration; closing (or dropping) the receiver removes
/// it.
///
/// # Example
///
/// ```rust,no_run
/// use shmport::port::{PortReceiver, Timeout};
///
/// let mut receiver = PortReceiver::initialize("svc.port")?;
/// let msg = receiver.receive(Timeout::from_millis(1000))?;
/// println!("type {} with {} bytes", msg.msg_type(), msg.content().len());
/// receiver.close()?;
/// # Ok::<(), shmport::Error>(())
/// ```
pub struct PortReceiver {
    id: HandleId,
    name: ResourceName,
    socket: UnixDatagram,
    /// `None` once the registration has been removed.
    path: Option<PathBuf>,
    /// Largest envelope plus one byte to detect oversized datagrams.
    buf: Box<[u8]>,
}

impl PortReceiver {
    /// Register `name` in the default runtime directory.
    pub fn initialize(name: &str) -> Result<Self> {
        Self::initialize_in(&PortConfig::default(), name)
    }

    /// Register `name` in `config`'s runtime directory.
    ///
    /// # Errors
    ///
    /// - `NameTooLong` / `InvalidName` before any system call.
    /// - `InitFailed` if the directory cannot be created, the resulting path
    ///   is too long (`ENAMETOOLONG`), or a live receiver already holds the
    ///   name (`EADDRINUSE`).
    pub fn initialize_in(config: &PortConfig, name: &str) -> Result<Self> {
        let name = ResourceName::new(name)?;
        let _span = span_port("initialize", name.as_str(), "receiver").entered();
        let path = registration_path(config, &name)?;

        std::fs::create_dir_all(config.runtime_dir())
            .map_err(|e| init_failed(&name, errno_of(&e)))?;

        let socket = match UnixDatagram::bind(&path) {
            Ok(socket) => socket,
            Err(e)
                if errno_of(&e) == Errno::ADDRINUSE && config.reclaim_stale && is_stale(&path) =>
            {
                tracing::warn!(name = %name, path = %path.display(), "reclaiming stale port registration");
                std::fs::remove_file(&path).map_err(|e| init_failed(&name, errno_of(&e)))?;
                UnixDatagram::bind(&path).map_err(|e| init_failed(&name, errno_of(&e)))?
            }
            Err(e) => return Err(init_failed(&name, errno_of(&e))),
        };

        tracing::debug!(name = %name, path = %path.display(), "receiver registered");

        Ok(Self {
            id: HandleId::next(),
            name,
            socket,
            path: Some(path),
            buf: vec![0u8; MAX_MESSAGE_LEN + 1].into_boxed_slice(),
        })
    }

    /// Handle token.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Registration path other processes connect to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Wait for one message.
    ///
    /// Messages from one sender arrive in the order they were sent.
    ///
    /// # Errors
    ///
    /// - `Timeout` if nothing arrives within `timeout`.
    /// - `BufferTooSmall` if a peer sent a datagram larger than the maximum
    ///   envelope (the datagram is discarded).
    /// - `ReceiveFailed` otherwise, including `EBADMSG` for datagrams
    ///   shorter than the header.
    pub fn receive(&mut self, timeout: Timeout) -> Result<Message> {
        let _span = span_port("receive", self.name.as_str(), "receiver").entered();
        let buf = &mut self.buf;

        let len = run_with_timeout(&self.socket, timeout, Direction::Receive, |s| {
            s.recv(&mut buf[..])
        })
        .map_err(|failure| match failure {
            Failure::TimedOut => {
                tracing::trace!(name = %self.name, ?timeout, "receive timed out");
                Error::Timeout {
                    operation: Operation::Receive,
                    after: timeout.duration(),
                }
            }
            Failure::Os(errno) => Error::ReceiveFailed { errno },
        })?;

        let message = Message::decode(&self.buf[..len])?;
        trace_payload("port receive", self.name.as_str(), message.content().len());
        Ok(message)
    }

    /// Take a pending message without blocking.
    pub fn try_receive(&mut self) -> Result<Option<Message>> {
        match self.receive(Timeout::Immediate) {
            Ok(message) => Ok(Some(message)),
            Err(Error::Timeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the registration and release the socket.
    ///
    /// # Errors
    ///
    /// `CloseFailed` if the registration file cannot be removed.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    /// Second descriptor for the same socket, used to wake a blocked
    /// receive from another thread.
    pub(crate) fn try_clone_socket(&self) -> std::io::Result<UnixDatagram> {
        self.socket.try_clone()
    }

    pub(crate) fn release(&mut self) -> Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        // Unlink while still bound so a successor's registration is never
        // removed by mistake.
        let result = std::fs::remove_file(&path).map_err(|e| Error::CloseFailed {
            errno: errno_of(&e),
        });
        tracing::debug!(name = %self.name, id = %self.id, "receiver closed");
        result
    }
}

impl std::fmt::Debug for PortReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortReceiver")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for PortReceiver {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(name = %self.name, error = %err, "failed to release port registration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoding;
    use crate::port::MAX_CONTENT_LEN;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[test]
    fn test_send_receive() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());

        let mut receiver = PortReceiver::initialize_in(&config, "svc.port").unwrap();
        let sender = PortSender::initialize_in(&config, "svc.port").unwrap();

        sender.send(1, b"ping", Timeout::from_millis(1000)).unwrap();
        let msg = receiver.receive(Timeout::from_millis(1000)).unwrap();
        assert_eq!(msg.msg_type(), 1);
        assert_eq!(msg.text(Encoding::Utf8), "ping");

        sender.close().unwrap();
        receiver.close().unwrap();
    }

    #[test]
    fn test_sender_without_receiver_fails() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());

        let err = PortSender::initialize_in(&config, "nobody").unwrap_err();
        assert!(matches!(err, Error::InitFailed { .. }));
        assert_eq!(err.os_code(), Some(Errno::NOENT.raw_os_error()));
    }

    #[test]
    fn test_receive_timeout() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = PortReceiver::initialize_in(&config, "idle").unwrap();

        let start = Instant::now();
        let err = receiver.receive(Timeout::from_millis(100)).unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(95), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "blocked too long: {elapsed:?}");
    }

    #[test]
    fn test_try_receive() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = PortReceiver::initialize_in(&config, "poll").unwrap();
        let sender = PortSender::initialize_in(&config, "poll").unwrap();

        assert_eq!(receiver.try_receive().unwrap(), None);
        sender.send(9, b"", Timeout::Immediate).unwrap();
        let msg = receiver.try_receive().unwrap().unwrap();
        assert_eq!(msg.msg_type(), 9);
        assert!(msg.content().is_empty());
    }

    #[test]
    fn test_oversized_content_rejected_before_send() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = PortReceiver::initialize_in(&config, "big").unwrap();
        let sender = PortSender::initialize_in(&config, "big").unwrap();

        let err = sender
            .send(1, &vec![7u8; MAX_CONTENT_LEN + 1], Timeout::Immediate)
            .unwrap_err();
        assert!(matches!(err, Error::ContentTooLarge { .. }));
        assert_eq!(receiver.try_receive().unwrap(), None);

        sender
            .send(1, &vec![7u8; MAX_CONTENT_LEN], Timeout::Immediate)
            .unwrap();
        let msg = receiver.receive(Timeout::from_millis(1000)).unwrap();
        assert_eq!(msg.content().len(), MAX_CONTENT_LEN);
    }

    #[test]
    fn test_oversized_datagram_from_foreign_peer() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = PortReceiver::initialize_in(&config, "foreign").unwrap();

        let rogue = UnixDatagram::unbound().unwrap();
        rogue
            .send_to(&vec![0u8; MAX_MESSAGE_LEN + 10], receiver.path().unwrap())
            .unwrap();
        assert!(matches!(
            receiver.receive(Timeout::from_millis(1000)),
            Err(Error::BufferTooSmall { .. })
        ));

        rogue.send_to(&[1], receiver.path().unwrap()).unwrap();
        let err = receiver.receive(Timeout::from_millis(1000)).unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::BADMSG.raw_os_error()));
    }

    #[test]
    fn test_live_registration_is_not_reclaimed() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let _first = PortReceiver::initialize_in(&config, "taken").unwrap();

        let err = PortReceiver::initialize_in(&config, "taken").unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::ADDRINUSE.raw_os_error()));
    }

    #[test]
    fn test_stale_registration_is_reclaimed() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let name = ResourceName::new("stale").unwrap();

        // A receiver that died without unlinking leaves its socket file.
        drop(UnixDatagram::bind(config.socket_path(&name)).unwrap());

        let receiver = PortReceiver::initialize_in(&config, "stale").unwrap();
        receiver.close().unwrap();

        drop(UnixDatagram::bind(config.socket_path(&name)).unwrap());
        let strict = config.clone().with_reclaim_stale(false);
        let err = PortReceiver::initialize_in(&strict, "stale").unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::ADDRINUSE.raw_os_error()));
    }

    #[test]
    fn test_close_removes_registration() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let receiver = PortReceiver::initialize_in(&config, "gone").unwrap();
        let path = receiver.path().unwrap().to_path_buf();
        assert!(path.exists());

        receiver.close().unwrap();
        assert!(!path.exists());
        assert!(PortSender::initialize_in(&config, "gone").is_err());
    }

    #[test]
    fn test_send_after_receiver_closed_fails() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let receiver = PortReceiver::initialize_in(&config, "vanish").unwrap();
        let sender = PortSender::initialize_in(&config, "vanish").unwrap();
        receiver.close().unwrap();

        let err = sender.send(1, b"late", Timeout::Immediate).unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));
    }

    #[test]
    fn test_path_too_long() {
        let deep = PathBuf::from("/tmp").join("d".repeat(100));
        let config = PortConfig::new(deep);
        let err = PortReceiver::initialize_in(&config, "svc").unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::NAMETOOLONG.raw_os_error()));
    }
}
