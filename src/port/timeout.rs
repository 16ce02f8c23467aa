//! Timeouts for blocking port operations.

use crate::error::errno_of;
use rustix::io::Errno;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::time::{Duration, Instant};

/// How long a send or receive may block.
///
/// A zero duration means "do not block": the operation is attempted once
/// and times out immediately if it cannot complete. Blocking without bound
/// has to be asked for explicitly with [`Timeout::Infinite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Block until the operation completes or fails.
    Infinite,
    /// Attempt once without blocking.
    Immediate,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    /// Timeout in milliseconds; `0` is [`Timeout::Immediate`].
    pub fn from_millis(ms: u64) -> Self {
        Duration::from_millis(ms).into()
    }

    /// The bound, if any. `Immediate` is `Some(Duration::ZERO)`.
    pub fn duration(&self) -> Option<Duration> {
        match *self {
            Self::Infinite => None,
            Self::Immediate => Some(Duration::ZERO),
            Self::After(d) => Some(d),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::Infinite
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::Immediate
        } else {
            Self::After(d)
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Infinite, Self::from)
    }
}

/// Socket mode for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Block,
    Poll,
    For(Duration),
}

/// Why a bounded attempt loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    TimedOut,
    Os(Errno),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Send,
    Receive,
}

struct Deadline {
    timeout: Timeout,
    at: Option<Instant>,
}

impl Deadline {
    fn start(timeout: Timeout) -> Self {
        let at = match timeout {
            Timeout::After(d) => Instant::now().checked_add(d),
            _ => None,
        };
        Self { timeout, at }
    }

    /// Mode for the next attempt; `None` once the deadline has passed.
    fn next_wait(&self) -> Option<Wait> {
        match (self.timeout, self.at) {
            (Timeout::Infinite, _) => Some(Wait::Block),
            (Timeout::Immediate, _) => Some(Wait::Poll),
            // Deadline beyond what `Instant` can represent.
            (Timeout::After(_), None) => Some(Wait::Block),
            (Timeout::After(_), Some(at)) => {
                let now = Instant::now();
                (now < at).then(|| Wait::For(at - now))
            }
        }
    }
}

fn apply(socket: &UnixDatagram, wait: Wait, dir: Direction) -> io::Result<()> {
    let (nonblocking, timeout) = match wait {
        Wait::Poll => (true, None),
        Wait::Block => (false, None),
        Wait::For(d) => (false, Some(d)),
    };
    socket.set_nonblocking(nonblocking)?;
    if nonblocking {
        return Ok(());
    }
    match dir {
        Direction::Send => socket.set_write_timeout(timeout),
        Direction::Receive => socket.set_read_timeout(timeout),
    }
}

/// Run `op` against `socket` until it succeeds, fails, or `timeout` passes.
///
/// `EINTR` is retried with whatever time is left.
pub(crate) fn run_with_timeout<T>(
    socket: &UnixDatagram,
    timeout: Timeout,
    dir: Direction,
    mut op: impl FnMut(&UnixDatagram) -> io::Result<T>,
) -> Result<T, Failure> {
    let deadline = Deadline::start(timeout);
    loop {
        let Some(wait) = deadline.next_wait() else {
            return Err(Failure::TimedOut);
        };
        apply(socket, wait, dir).map_err(|e| Failure::Os(errno_of(&e)))?;

        match op(socket) {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) && wait != Wait::Block =>
            {
                return Err(Failure::TimedOut);
            }
            Err(e) => return Err(Failure::Os(errno_of(&e))),
        }
    }
}
