//! Access modes, permission bits and open options for shared segments.
//!
//! The raw values of [`PageAccess`], [`FileMapAccess`] and [`FileMode`] are
//! part of the cross-process contract: independently built processes pass
//! them around as plain integers and must agree on them.

use rustix::fs::Mode;
use rustix::mm::{MapFlags, ProtFlags};
use rustix::shm;

/// How a segment's view is mapped into this process.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageAccess {
    /// Read-only view. Writes are rejected.
    ReadOnly = 0x02,
    /// Shared read-write view; writes are visible to every process.
    ReadWrite = 0x04,
    /// Private copy-on-write view; writes stay in this process.
    WriteCopy = 0x08,
}

impl PageAccess {
    /// Parse a raw access value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x02 => Some(Self::ReadOnly),
            0x04 => Some(Self::ReadWrite),
            0x08 => Some(Self::WriteCopy),
            _ => None,
        }
    }

    /// Raw access value.
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Whether writes through this view are allowed.
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Flags for opening an existing object with this access.
    ///
    /// Copy-on-write only needs read access to the object itself.
    pub(crate) fn open_flags(self) -> shm::OFlags {
        match self {
            Self::ReadWrite => shm::OFlags::RDWR,
            Self::ReadOnly | Self::WriteCopy => shm::OFlags::RDONLY,
        }
    }

    pub(crate) fn prot_flags(self) -> ProtFlags {
        match self {
            Self::ReadOnly => ProtFlags::READ,
            Self::ReadWrite | Self::WriteCopy => ProtFlags::READ | ProtFlags::WRITE,
        }
    }

    pub(crate) fn map_flags(self) -> MapFlags {
        match self {
            Self::WriteCopy => MapFlags::PRIVATE,
            Self::ReadOnly | Self::ReadWrite => MapFlags::SHARED,
        }
    }
}

impl std::fmt::Display for PageAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
            Self::WriteCopy => write!(f, "write-copy"),
        }
    }
}

/// Desired access to a file-mapping object, as exchanged by peers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMapAccess {
    /// Read access.
    Read = 0x0004,
    /// Write access (implies read).
    Write = 0x0002,
    /// Full access.
    AllAccess = 0xf001f,
}

impl FileMapAccess {
    /// Parse a raw desired-access value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x0004 => Some(Self::Read),
            0x0002 => Some(Self::Write),
            0xf001f => Some(Self::AllAccess),
            _ => None,
        }
    }

    /// Raw desired-access value.
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl From<FileMapAccess> for PageAccess {
    fn from(access: FileMapAccess) -> Self {
        match access {
            FileMapAccess::Read => PageAccess::ReadOnly,
            FileMapAccess::Write | FileMapAccess::AllAccess => PageAccess::ReadWrite,
        }
    }
}

/// Owner/group/other permission bits for a newly created object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode(u32);

impl FileMode {
    /// Owner read.
    pub const OWNER_READ: Self = Self(0o400);
    /// Owner write.
    pub const OWNER_WRITE: Self = Self(0o200);
    /// Owner execute.
    pub const OWNER_EXEC: Self = Self(0o100);
    /// Group read.
    pub const GROUP_READ: Self = Self(0o040);
    /// Group write.
    pub const GROUP_WRITE: Self = Self(0o020);
    /// Group execute.
    pub const GROUP_EXEC: Self = Self(0o010);
    /// Others read.
    pub const OTHER_READ: Self = Self(0o004);
    /// Others write.
    pub const OTHER_WRITE: Self = Self(0o002);
    /// Others execute.
    pub const OTHER_EXEC: Self = Self(0o001);
    /// `0o600`
    pub const OWNER_RW: Self = Self(0o600);
    /// `0o666`
    pub const ALL_RW: Self = Self(0o666);

    /// Build from raw bits; anything outside `0o777` is dropped.
    pub const fn from_raw(bits: u32) -> Self {
        Self(bits & 0o777)
    }

    /// Raw permission bits.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn to_mode(self) -> Mode {
        Mode::from_raw_mode(self.0 as _)
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self::OWNER_RW
    }
}

impl std::ops::BitOr for FileMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#o}", self.0)
    }
}

/// What `create` does when the name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistsPolicy {
    /// Fail with `CreateFailed(EEXIST)`.
    #[default]
    Fail,
    /// Treat the existing object as abandoned: unlink it and create anew.
    Reclaim,
}

/// Which handles remove the name from the system when they close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnlinkPolicy {
    /// Only the handle that created the object unlinks it.
    #[default]
    OwnerOnly,
    /// Every handle unlinks on close.
    Always,
    /// The name outlives all handles until unlinked elsewhere.
    Never,
}

impl UnlinkPolicy {
    pub(crate) fn applies(self, owner: bool) -> bool {
        match self {
            Self::OwnerOnly => owner,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Options for creating or opening a [`SharedSegment`](super::SharedSegment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentOptions {
    /// Mapping mode.
    pub access: PageAccess,
    /// Permission bits for newly created objects.
    pub mode: FileMode,
    /// Behavior on name collision during create.
    pub on_exists: ExistsPolicy,
    /// Unlink behavior on close.
    pub unlink: UnlinkPolicy,
}

impl Default for PageAccess {
    fn default() -> Self {
        Self::ReadWrite
    }
}

impl SegmentOptions {
    /// Options with the given access and mode, default policies otherwise.
    pub fn new(access: PageAccess, mode: FileMode) -> Self {
        Self {
            access,
            mode,
            ..Self::default()
        }
    }

    /// Set the mapping mode.
    pub fn with_access(mut self, access: PageAccess) -> Self {
        self.access = access;
        self
    }

    /// Set the permission bits.
    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the name-collision policy.
    pub fn on_exists(mut self, policy: ExistsPolicy) -> Self {
        self.on_exists = policy;
        self
    }

    /// Set the unlink policy.
    pub fn with_unlink(mut self, policy: UnlinkPolicy) -> Self {
        self.unlink = policy;
        self
    }
}
