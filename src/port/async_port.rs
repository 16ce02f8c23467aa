//! Async wrappers over the blocking endpoints.
//!
//! Every call runs the blocking operation on tokio's blocking pool, so
//! waiting for a message never stalls the async runtime. Timeouts behave
//! exactly as in the blocking API.

use super::endpoint::{PortReceiver, PortSender};
use super::message::Message;
use super::timeout::Timeout;
use crate::config::PortConfig;
use crate::error::{Error, Result, errno_of};
use crate::handle::HandleId;
use rustix::io::Errno;
use std::net::Shutdown;
use std::os::unix::net::UnixDatagram;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock(receiver: &Mutex<PortReceiver>) -> MutexGuard<'_, PortReceiver> {
    // A panic mid-receive leaves the endpoint itself consistent.
    receiver.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Async send side of a port.
#[derive(Debug, Clone)]
pub struct AsyncPortSender {
    inner: Arc<PortSender>,
}

impl AsyncPortSender {
    /// Look up `name` in the default runtime directory.
    pub async fn initialize(name: &str) -> Result<Self> {
        Self::initialize_in(&PortConfig::default(), name).await
    }

    /// Look up `name` in `config`'s runtime directory.
    pub async fn initialize_in(config: &PortConfig, name: &str) -> Result<Self> {
        let config = config.clone();
        let name = name.to_owned();
        let sender =
            tokio::task::spawn_blocking(move || PortSender::initialize_in(&config, &name)).await??;
        Ok(Self::from(sender))
    }

    /// Handle token.
    pub fn id(&self) -> HandleId {
        self.inner.id()
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Send one message; see [`PortSender::send`].
    pub async fn send(&self, msg_type: i32, content: Vec<u8>, timeout: Timeout) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.send(msg_type, &content, timeout)).await?
    }

    /// Send a prebuilt message.
    pub async fn send_message(&self, message: Message, timeout: Timeout) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.send_message(&message, timeout)).await?
    }

    /// Release the endpoint.
    ///
    /// Clones share one connection: closing any of them shuts it down, and
    /// sends through the remaining clones fail with `SendFailed`.
    pub async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(sender) => sender.close(),
            Err(shared) => shared.shutdown(),
        }
    }
}

impl From<PortSender> for AsyncPortSender {
    fn from(sender: PortSender) -> Self {
        Self {
            inner: Arc::new(sender),
        }
    }
}

/// Async receive side of a port.
#[derive(Debug)]
pub struct AsyncPortReceiver {
    inner: Arc<Mutex<PortReceiver>>,
    /// Same socket as `inner`, reachable without the lock.
    waker: UnixDatagram,
    id: HandleId,
    name: String,
}

impl AsyncPortReceiver {
    /// Register `name` in the default runtime directory.
    pub async fn initialize(name: &str) -> Result<Self> {
        Self::initialize_in(&PortConfig::default(), name).await
    }

    /// Register `name` in `config`'s runtime directory.
    pub async fn initialize_in(config: &PortConfig, name: &str) -> Result<Self> {
        let config = config.clone();
        let name = name.to_owned();
        let receiver =
            tokio::task::spawn_blocking(move || PortReceiver::initialize_in(&config, &name))
                .await??;
        Self::try_from(receiver)
    }

    /// Handle token.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for one message; see [`PortReceiver::receive`].
    pub async fn receive(&mut self, timeout: Timeout) -> Result<Message> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || lock(&inner).receive(timeout)).await?
    }

    /// Take a pending message without blocking.
    pub async fn try_receive(&mut self) -> Result<Option<Message>> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || lock(&inner).try_receive()).await?
    }

    /// Remove the registration and release the socket.
    ///
    /// A receive abandoned by a cancelled future may still be blocked on the
    /// blocking pool. Close shuts the socket's read side first so that
    /// receive returns, then removes the registration under the lock.
    ///
    /// # Errors
    ///
    /// `CloseFailed` if the socket cannot be shut down or the registration
    /// file cannot be removed.
    pub async fn close(self) -> Result<()> {
        match self.waker.shutdown(Shutdown::Read) {
            Ok(()) => {}
            Err(e) if errno_of(&e) == Errno::NOTCONN => {}
            Err(e) => {
                return Err(Error::CloseFailed {
                    errno: errno_of(&e),
                });
            }
        }

        let inner = self.inner;
        tokio::task::spawn_blocking(move || match Arc::try_unwrap(inner) {
            Ok(mutex) => mutex
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .close(),
            // The woken receive still holds a reference; the socket goes
            // away with it once the registration is removed here.
            Err(shared) => lock(&shared).release(),
        })
        .await?
    }
}

impl TryFrom<PortReceiver> for AsyncPortReceiver {
    type Error = Error;

    fn try_from(receiver: PortReceiver) -> Result<Self> {
        let waker = receiver
            .try_clone_socket()
            .map_err(|e| Error::InitFailed {
                name: receiver.name().to_owned(),
                errno: errno_of(&e),
            })?;
        Ok(Self {
            id: receiver.id(),
            name: receiver.name().to_owned(),
            waker,
            inner: Arc::new(Mutex::new(receiver)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_async_send_receive() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());

        let mut receiver = AsyncPortReceiver::initialize_in(&config, "svc")
            .await
            .unwrap();
        let sender = AsyncPortSender::initialize_in(&config, "svc").await.unwrap();
        assert_eq!(receiver.name(), "svc");

        sender
            .send(4, b"ping".to_vec(), Timeout::from_millis(1000))
            .await
            .unwrap();
        let msg = receiver.receive(Timeout::from_millis(1000)).await.unwrap();
        assert_eq!(msg.msg_type(), 4);
        assert_eq!(msg.content(), b"ping");

        sender.close().await.unwrap();
        receiver.close().await.unwrap();
        assert!(!dir.path().join("svc.port").exists());
    }

    #[tokio::test]
    async fn test_async_receive_timeout() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = AsyncPortReceiver::initialize_in(&config, "quiet")
            .await
            .unwrap();

        let err = receiver
            .receive(Timeout::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(receiver.try_receive().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_after_cancelled_receive() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = AsyncPortReceiver::initialize_in(&config, "cancel")
            .await
            .unwrap();

        let pending =
            tokio::time::timeout(Duration::from_millis(50), receiver.receive(Timeout::Infinite))
                .await;
        assert!(pending.is_err(), "receive should still be waiting");

        receiver.close().await.unwrap();
        assert!(!dir.path().join("cancel.port").exists());
        assert!(matches!(
            PortSender::initialize_in(&config, "cancel"),
            Err(Error::InitFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_closing_one_clone_closes_all() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let mut receiver = AsyncPortReceiver::initialize_in(&config, "shared")
            .await
            .unwrap();
        let sender = AsyncPortSender::initialize_in(&config, "shared")
            .await
            .unwrap();
        let twin = sender.clone();

        sender.send(1, vec![1], Timeout::Immediate).await.unwrap();
        twin.close().await.unwrap();

        let err = sender.send(2, vec![2], Timeout::Immediate).await.unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));
        assert_eq!(receiver.receive(Timeout::Immediate).await.unwrap().msg_type(), 1);

        sender.close().await.unwrap();
        receiver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_async_sender_without_receiver() {
        let dir = tempdir().unwrap();
        let config = PortConfig::new(dir.path());
        let err = AsyncPortSender::initialize_in(&config, "absent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InitFailed { .. }));
    }
}
