//! Named POSIX shared memory segments.
//!
//! A segment is a `shm_open` object mapped into this process with `mmap`.
//! The first process creates it, the others open it by name. Transfers
//! always start at offset 0 and never exceed the mapped capacity.

use super::{ExistsPolicy, PageAccess, SegmentOptions};
use crate::codec::{Encoding, Payload};
use crate::error::{Error, Result};
use crate::handle::{HandleId, ResourceName};
use crate::observability::{span_segment, trace_payload};
use rustix::fd::OwnedFd;
use rustix::io::Errno;
use rustix::shm;
use std::ptr::NonNull;

/// An open, mapped shared memory segment.
///
/// Obtained from [`create`](Self::create) or [`open`](Self::open); released
/// by [`close`](Self::close) or, best-effort, on drop. Two handles to the
/// same name (for example a creator and an opener) are independent and each
/// must be closed.
///
/// # Example
///
/// ```rust,no_run
/// use shmport::memory::{FileMode, PageAccess, SharedSegment};
/// use shmport::Encoding;
///
/// let mut seg = SharedSegment::create("seg1", PageAccess::ReadWrite, FileMode::OWNER_RW, 1024)?;
/// seg.write(b"hello")?;
///
/// let peer = SharedSegment::open("seg1", PageAccess::ReadOnly, FileMode::OWNER_RW, 1024)?;
/// assert_eq!(peer.read_text(Encoding::Utf8, None)?, "hello");
///
/// peer.close()?;
/// seg.close()?;
/// # Ok::<(), shmport::Error>(())
/// ```
pub struct SharedSegment {
    id: HandleId,
    name: ResourceName,
    /// Start of the mapped view.
    ptr: NonNull<u8>,
    /// Mapped length in bytes.
    capacity: usize,
    access: PageAccess,
    owner: bool,
    unlink_on_close: bool,
    /// `None` once released.
    fd: Option<OwnedFd>,
}

impl SharedSegment {
    /// Create and map a new segment of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// - `NameTooLong` / `InvalidName` before any system call.
    /// - `ZeroCapacity` if `capacity` is 0.
    /// - `CreateFailed` if `shm_open` or sizing fails (e.g. `EEXIST`).
    /// - `MapFailed` if `mmap` fails; the new object is unlinked first.
    pub fn create(
        name: &str,
        access: PageAccess,
        mode: super::FileMode,
        capacity: usize,
    ) -> Result<Self> {
        Self::create_with(name, capacity, &SegmentOptions::new(access, mode))
    }

    /// Create with explicit options.
    pub fn create_with(name: &str, capacity: usize, opts: &SegmentOptions) -> Result<Self> {
        let name = ResourceName::new(name)?;
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }

        let _span = span_segment("create", name.as_str()).entered();
        let path = name.shm_path();
        let flags = shm::OFlags::CREATE | shm::OFlags::EXCL | shm::OFlags::RDWR;

        let fd = match shm::open(path.as_str(), flags, opts.mode.to_mode()) {
            Ok(fd) => fd,
            Err(Errno::EXIST) if opts.on_exists == ExistsPolicy::Reclaim => {
                tracing::warn!(name = %name, "reclaiming abandoned shared memory object");
                shm::unlink(path.as_str()).map_err(|errno| Error::CreateFailed {
                    name: name.to_string(),
                    errno,
                })?;
                shm::open(path.as_str(), flags, opts.mode.to_mode()).map_err(|errno| {
                    Error::CreateFailed {
                        name: name.to_string(),
                        errno,
                    }
                })?
            }
            Err(errno) => {
                return Err(Error::CreateFailed {
                    name: name.to_string(),
                    errno,
                });
            }
        };

        // From here on the name exists; unwind it on any failure.
        if let Err(errno) = rustix::fs::ftruncate(&fd, capacity as u64) {
            let _ = shm::unlink(path.as_str());
            return Err(Error::CreateFailed {
                name: name.to_string(),
                errno,
            });
        }

        let ptr = match map_view(&fd, capacity, opts.access) {
            Ok(ptr) => ptr,
            Err(errno) => {
                let _ = shm::unlink(path.as_str());
                return Err(Error::MapFailed {
                    name: name.to_string(),
                    errno,
                });
            }
        };

        tracing::debug!(name = %name, capacity, access = %opts.access, mode = %opts.mode, "created segment");

        Ok(Self {
            id: HandleId::next(),
            name,
            ptr,
            capacity,
            access: opts.access,
            owner: true,
            unlink_on_close: opts.unlink.applies(true),
            fd: Some(fd),
        })
    }

    /// Open and map an existing segment of at least `capacity` bytes.
    ///
    /// `mode` is only meaningful for creation and is accepted for symmetry
    /// with [`create`](Self::create).
    ///
    /// # Errors
    ///
    /// - `NameTooLong` / `InvalidName` before any system call.
    /// - `OpenFailed` if the object cannot be opened (e.g. `ENOENT`).
    /// - `CapacityExceeded` if the object is smaller than `capacity`.
    /// - `MapFailed` if `mmap` fails.
    pub fn open(
        name: &str,
        access: PageAccess,
        mode: super::FileMode,
        capacity: usize,
    ) -> Result<Self> {
        Self::open_with(name, Some(capacity), &SegmentOptions::new(access, mode))
    }

    /// Open an existing segment and map its whole current size.
    pub fn open_existing(name: &str, access: PageAccess) -> Result<Self> {
        Self::open_with(name, None, &SegmentOptions::default().with_access(access))
    }

    /// Open with explicit options. `None` maps the object's current size.
    pub fn open_with(name: &str, capacity: Option<usize>, opts: &SegmentOptions) -> Result<Self> {
        let name = ResourceName::new(name)?;
        if capacity == Some(0) {
            return Err(Error::ZeroCapacity);
        }

        let _span = span_segment("open", name.as_str()).entered();
        let open_failed = |errno| Error::OpenFailed {
            name: name.to_string(),
            errno,
        };

        let fd = shm::open(
            name.shm_path().as_str(),
            opts.access.open_flags(),
            opts.mode.to_mode(),
        )
        .map_err(open_failed)?;

        let actual = rustix::fs::fstat(&fd).map_err(open_failed)?.st_size.max(0) as usize;
        let capacity = match capacity {
            Some(requested) if requested > actual => {
                return Err(Error::CapacityExceeded {
                    requested,
                    capacity: actual,
                });
            }
            Some(requested) => requested,
            None if actual == 0 => return Err(Error::ZeroCapacity),
            None => actual,
        };

        let ptr = map_view(&fd, capacity, opts.access).map_err(|errno| Error::MapFailed {
            name: name.to_string(),
            errno,
        })?;

        tracing::debug!(name = %name, capacity, access = %opts.access, "opened segment");

        Ok(Self {
            id: HandleId::next(),
            name,
            ptr,
            capacity,
            access: opts.access,
            owner: false,
            unlink_on_close: opts.unlink.applies(false),
            fd: Some(fd),
        })
    }

    /// Handle token.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Segment name as supplied at create/open time.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Mapped size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mapping mode.
    pub fn access(&self) -> PageAccess {
        self.access
    }

    /// Whether this handle created the underlying object.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Copy `data` to the start of the segment.
    ///
    /// All-or-nothing: if `data` is longer than the capacity nothing is
    /// written.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.access.is_writable() {
            return Err(Error::ReadOnlySegment {
                name: self.name.to_string(),
            });
        }
        if data.len() > self.capacity {
            return Err(Error::CapacityExceeded {
                requested: data.len(),
                capacity: self.capacity,
            });
        }

        // SAFETY: the view is mapped writable for `capacity` bytes and
        // `data.len() <= capacity`. Raw copies avoid forming a reference to
        // memory other processes may be writing.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr(), data.len());
        }
        trace_payload("segment write", self.name.as_str(), data.len());
        Ok(())
    }

    /// Encode `payload` and copy it to the start of the segment.
    pub fn write_payload(&mut self, payload: Payload<'_>) -> Result<()> {
        self.write(&payload.to_bytes())
    }

    /// Copy `len` bytes (default: the whole capacity) from the start of the
    /// segment.
    pub fn read(&self, len: Option<usize>) -> Result<Vec<u8>> {
        let len = len.unwrap_or(self.capacity);
        if len > self.capacity {
            return Err(Error::CapacityExceeded {
                requested: len,
                capacity: self.capacity,
            });
        }

        let mut out = vec![0u8; len];
        // SAFETY: the view is readable for `capacity` bytes and `len <= capacity`.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), out.as_mut_ptr(), len);
        }
        trace_payload("segment read", self.name.as_str(), len);
        Ok(out)
    }

    /// Read and decode as text; trailing NUL fill is dropped.
    pub fn read_text(&self, encoding: Encoding, len: Option<usize>) -> Result<String> {
        Ok(encoding.decode(&self.read(len)?))
    }

    /// Unmap the view, close the descriptor and unlink the name if this
    /// handle's policy says so.
    ///
    /// # Errors
    ///
    /// `CloseFailed` with the first OS error encountered. The handle is
    /// released either way.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };

        let mut first_err = None;

        // SAFETY: `ptr`/`capacity` describe the mapping made at construction,
        // and `fd.take()` above guarantees this runs once.
        if let Err(errno) = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.capacity) } {
            first_err.get_or_insert(errno);
        }
        drop(fd);

        if self.unlink_on_close {
            match shm::unlink(self.name.shm_path().as_str()) {
                Ok(()) => {}
                // Another handle already removed the name.
                Err(Errno::NOENT) => {
                    tracing::debug!(name = %self.name, "segment already unlinked");
                }
                Err(errno) => {
                    first_err.get_or_insert(errno);
                }
            }
        }

        tracing::debug!(name = %self.name, id = %self.id, "closed segment");

        match first_err {
            Some(errno) => Err(Error::CloseFailed { errno }),
            None => Ok(()),
        }
    }
}

fn map_view(fd: &OwnedFd, len: usize, access: PageAccess) -> rustix::io::Result<NonNull<u8>> {
    // SAFETY: mapping a fresh region chosen by the kernel; no existing memory
    // is affected.
    let ptr = unsafe {
        rustix::mm::mmap(
            std::ptr::null_mut(),
            len,
            access.prot_flags(),
            access.map_flags(),
            fd,
            0,
        )?
    };
    NonNull::new(ptr.cast::<u8>()).ok_or(Errno::NOMEM)
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .field("capacity", &self.capacity)
            .field("access", &self.access)
            .field("owner", &self.owner)
            .finish()
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(name = %self.name, error = %err, "failed to release segment");
        }
    }
}

// SAFETY: the mapping is process-wide and owned by this handle; moving it to
// another thread moves sole ownership. The type is deliberately not `Sync`:
// concurrent use needs external synchronization.
unsafe impl Send for SharedSegment {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FileMode, UnlinkPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique_name(tag: &str) -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "u-{}-{}-{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_write_read() {
        let name = unique_name("rw");
        let mut seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 4096).unwrap();
        assert_eq!(seg.capacity(), 4096);
        assert!(seg.is_owner());
        assert_eq!(seg.name(), name);

        seg.write(&[42, 43, 44]).unwrap();
        assert_eq!(seg.read(Some(3)).unwrap(), vec![42, 43, 44]);
        assert_eq!(seg.read(None).unwrap().len(), 4096);

        seg.close().unwrap();
    }

    #[test]
    fn test_zero_capacity_fails() {
        let result =
            SharedSegment::create(&unique_name("zero"), PageAccess::ReadWrite, FileMode::OWNER_RW, 0);
        assert!(matches!(result, Err(Error::ZeroCapacity)));
    }

    #[test]
    fn test_write_over_capacity_is_rejected_whole() {
        let mut seg = SharedSegment::create(
            &unique_name("cap"),
            PageAccess::ReadWrite,
            FileMode::OWNER_RW,
            8,
        )
        .unwrap();
        seg.write(b"12345678").unwrap();

        let err = seg.write(b"abcdefghi").unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                requested: 9,
                capacity: 8
            }
        ));
        assert_eq!(seg.read(None).unwrap(), b"12345678");

        assert!(matches!(
            seg.read(Some(9)),
            Err(Error::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_create_collision_fails_by_default() {
        let name = unique_name("dup");
        let first =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();

        let err = SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64)
            .unwrap_err();
        assert!(matches!(err, Error::CreateFailed { .. }));
        assert_eq!(err.os_code(), Some(Errno::EXIST.raw_os_error()));

        first.close().unwrap();
    }

    #[test]
    fn test_create_reclaims_abandoned_object() {
        let name = unique_name("stale");
        let opts = SegmentOptions::default().with_unlink(UnlinkPolicy::Never);
        let abandoned = SharedSegment::create_with(&name, 64, &opts).unwrap();
        drop(abandoned);

        let opts = SegmentOptions::default().on_exists(ExistsPolicy::Reclaim);
        let seg = SharedSegment::create_with(&name, 128, &opts).unwrap();
        assert_eq!(seg.capacity(), 128);
        seg.close().unwrap();
    }

    #[test]
    fn test_open_missing_fails() {
        let err = SharedSegment::open(
            &unique_name("missing"),
            PageAccess::ReadOnly,
            FileMode::OWNER_RW,
            64,
        )
        .unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
        assert_eq!(err.os_code(), Some(Errno::NOENT.raw_os_error()));
    }

    #[test]
    fn test_open_larger_than_object_fails() {
        let name = unique_name("small");
        let seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();

        let err =
            SharedSegment::open(&name, PageAccess::ReadOnly, FileMode::OWNER_RW, 65).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                requested: 65,
                capacity: 64
            }
        ));

        seg.close().unwrap();
    }

    #[test]
    fn test_open_existing_uses_object_size() {
        let name = unique_name("size");
        let seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 300).unwrap();

        let peer = SharedSegment::open_existing(&name, PageAccess::ReadOnly).unwrap();
        assert_eq!(peer.capacity(), 300);
        assert!(!peer.is_owner());

        peer.close().unwrap();
        seg.close().unwrap();
    }

    #[test]
    fn test_read_only_rejects_write() {
        let name = unique_name("ro");
        let seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();

        let mut peer =
            SharedSegment::open(&name, PageAccess::ReadOnly, FileMode::OWNER_RW, 64).unwrap();
        assert!(matches!(
            peer.write(b"nope"),
            Err(Error::ReadOnlySegment { .. })
        ));

        peer.close().unwrap();
        seg.close().unwrap();
    }

    #[test]
    fn test_write_copy_stays_private() {
        let name = unique_name("cow");
        let mut seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();
        seg.write(b"shared").unwrap();

        let mut private =
            SharedSegment::open(&name, PageAccess::WriteCopy, FileMode::OWNER_RW, 64).unwrap();
        assert_eq!(private.read(Some(6)).unwrap(), b"shared");

        private.write(b"mine!!").unwrap();
        assert_eq!(private.read(Some(6)).unwrap(), b"mine!!");
        assert_eq!(seg.read(Some(6)).unwrap(), b"shared");

        private.close().unwrap();
        seg.close().unwrap();
    }

    #[test]
    fn test_owner_close_unlinks_name() {
        let name = unique_name("unlink");
        let seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();
        seg.close().unwrap();

        let err =
            SharedSegment::open(&name, PageAccess::ReadOnly, FileMode::OWNER_RW, 64).unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }

    #[test]
    fn test_opener_close_keeps_name() {
        let name = unique_name("keep");
        let mut seg =
            SharedSegment::create(&name, PageAccess::ReadWrite, FileMode::OWNER_RW, 64).unwrap();
        seg.write(b"still here").unwrap();

        let peer =
            SharedSegment::open(&name, PageAccess::ReadOnly, FileMode::OWNER_RW, 64).unwrap();
        peer.close().unwrap();

        let again =
            SharedSegment::open(&name, PageAccess::ReadOnly, FileMode::OWNER_RW, 64).unwrap();
        assert_eq!(
            again.read_text(Encoding::Utf8, None).unwrap(),
            "still here"
        );

        again.close().unwrap();
        seg.close().unwrap();
    }

    #[test]
    fn test_write_payload_utf16() {
        let mut seg = SharedSegment::create(
            &unique_name("u16"),
            PageAccess::ReadWrite,
            FileMode::OWNER_RW,
            64,
        )
        .unwrap();
        seg.write_payload(Payload::utf16("hi")).unwrap();
        assert_eq!(seg.read(Some(4)).unwrap(), vec![b'h', 0, b'i', 0]);
        assert_eq!(seg.read_text(Encoding::Utf16Le, None).unwrap(), "hi");
        seg.close().unwrap();
    }

    #[test]
    fn test_failed_sizing_leaves_no_object() {
        // No file system accepts this length.
        let name = unique_name("trunc");
        let err = SharedSegment::create(
            &name,
            PageAccess::ReadWrite,
            FileMode::OWNER_RW,
            usize::MAX,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CreateFailed { .. }));

        let err = SharedSegment::open_existing(&name, PageAccess::ReadOnly).unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::NOENT.raw_os_error()));
    }

    #[test]
    fn test_failed_mapping_leaves_no_object() {
        // Sparse objects this large can be sized on tmpfs, but never mapped.
        let name = unique_name("map");
        let err = SharedSegment::create(
            &name,
            PageAccess::ReadWrite,
            FileMode::OWNER_RW,
            1 << 62,
        )
        .unwrap_err();
        assert!(
            matches!(err, Error::MapFailed { .. } | Error::CreateFailed { .. }),
            "unexpected error: {err:?}"
        );

        let err = SharedSegment::open_existing(&name, PageAccess::ReadOnly).unwrap_err();
        assert_eq!(err.os_code(), Some(Errno::NOENT.raw_os_error()));
    }
}
