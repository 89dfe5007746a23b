//! Virtual ring buffer: a window of recent stream history that can always be
//! read as one contiguous slice.
//!
//! The backing store is mapped twice, back to back, so the byte at offset
//! `i` is also visible at `i + capacity`. A read or write that runs off the
//! end of the first mapping simply continues into the second one; callers
//! never split an access at the wrap point.
//!
//! ```text
//! |<------ capacity ------>|<------ capacity ------>|
//! [ first mapping          ][ mirror (same pages)    ]
//!        ^ past(len)  ^ write_cursor
//! ```
//!
//! This is not a FIFO: nothing is ever consumed. `past(len)` just looks back
//! `len` bytes from the newest write.

use std::mem;

use crate::models::error::RingBufferError;

/// Granularity used when the host page size cannot be queried.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Round `requested` up to the next multiple of `unit`.
pub fn round_up(requested: usize, unit: usize) -> usize {
    requested.div_ceil(unit) * unit
}

/// Page size of the host, in bytes.
pub fn host_page_size() -> usize {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page > 0 {
            return page as usize;
        }
    }
    FALLBACK_PAGE_SIZE
}

enum Region {
    #[cfg(target_os = "linux")]
    Mapped(mapping::DoubleMapping),
    /// Manually doubled buffer; every write is copied into both halves.
    /// `u64` words keep the byte view 8-aligned for sample access.
    Heap(Vec<u64>),
}

pub struct VirtualRingBuffer {
    region: Region,
    capacity: usize,
    /// Next byte to be written. Always inside the first mapping.
    write_cursor: usize,
}

impl VirtualRingBuffer {
    /// Double-mapped buffer of at least `requested` bytes, rounded up to the
    /// host page size.
    pub fn new(requested: usize) -> Result<Self, RingBufferError> {
        Self::with_unit(requested, None)
    }

    /// Double-mapped buffer rounded up to `unit` bytes (None = host page).
    ///
    /// `unit` must be a multiple of the host page so both mappings can be
    /// placed. On targets without memfd this falls back to [`Self::heap`].
    pub fn with_unit(requested: usize, unit: Option<usize>) -> Result<Self, RingBufferError> {
        let page = host_page_size();
        let unit = unit.unwrap_or(page);
        if unit == 0 || unit % page != 0 {
            return Err(RingBufferError::BadGranularity { unit, page });
        }
        if requested == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        let capacity = round_up(requested, unit);

        #[cfg(target_os = "linux")]
        {
            let mapping = mapping::DoubleMapping::new(capacity)?;
            log::debug!("ring buffer mapped: {} bytes x 2", capacity);
            Ok(Self {
                region: Region::Mapped(mapping),
                capacity,
                write_cursor: 0,
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::heap(capacity, unit)
        }
    }

    /// Heap-backed buffer with the same contract, at the cost of a second
    /// copy on every write.
    pub fn heap(requested: usize, unit: usize) -> Result<Self, RingBufferError> {
        if unit == 0 {
            return Err(RingBufferError::BadGranularity { unit, page: 1 });
        }
        if requested == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        let capacity = round_up(requested, unit);
        let words = (2 * capacity).div_ceil(mem::size_of::<u64>());

        Ok(Self {
            region: Region::Heap(vec![0; words]),
            capacity,
            write_cursor: 0,
        })
    }

    /// Usable history length in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Append `bytes` at the write cursor and advance it.
    ///
    /// # Panics
    /// If `bytes` is longer than the capacity.
    pub fn append(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        assert!(
            len <= self.capacity,
            "append of {} bytes exceeds capacity {}",
            len,
            self.capacity
        );
        let start = self.write_cursor;
        self.full_mut()[start..start + len].copy_from_slice(bytes);
        self.advance(len);
    }

    /// Writable view of the next `len` bytes at the write cursor. Commit the
    /// bytes written with [`Self::advance`].
    ///
    /// # Panics
    /// If `len` is larger than the capacity.
    pub fn present_mut(&mut self, len: usize) -> &mut [u8] {
        assert!(len <= self.capacity, "present of {} bytes exceeds capacity {}", len, self.capacity);
        let start = self.write_cursor;
        &mut self.full_mut()[start..start + len]
    }

    /// Move the write cursor ahead by `len` bytes that were just written.
    ///
    /// # Panics
    /// If `len` is larger than the capacity.
    pub fn advance(&mut self, len: usize) {
        assert!(len <= self.capacity, "advance of {} bytes exceeds capacity {}", len, self.capacity);
        if let Region::Heap(_) = self.region {
            self.sync_mirror(self.write_cursor, len);
        }
        self.write_cursor = (self.write_cursor + len) % self.capacity;
    }

    /// The last `len` bytes written, oldest first, as one contiguous slice.
    ///
    /// # Panics
    /// If `len` is larger than the capacity.
    pub fn past(&self, len: usize) -> &[u8] {
        assert!(len <= self.capacity, "past of {} bytes exceeds capacity {}", len, self.capacity);
        let start = (self.write_cursor + self.capacity - len) % self.capacity;
        &self.full()[start..start + len]
    }

    /// Append samples in native byte order.
    pub fn append_samples(&mut self, samples: &[f32]) {
        // SAFETY: f32 has no padding and u8 has no alignment requirement.
        let bytes = unsafe {
            std::slice::from_raw_parts(samples.as_ptr().cast::<u8>(), mem::size_of_val(samples))
        };
        self.append(bytes);
    }

    /// The last `count` samples appended with [`Self::append_samples`].
    ///
    /// # Panics
    /// If the window is larger than the capacity or the history was written
    /// with byte counts that are not whole samples.
    pub fn past_samples(&self, count: usize) -> &[f32] {
        let bytes = self.past(count * mem::size_of::<f32>());
        assert_eq!(
            bytes.as_ptr() as usize % mem::align_of::<f32>(),
            0,
            "sample history is misaligned"
        );
        // SAFETY: alignment checked above; every bit pattern is a valid f32.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<f32>(), count) }
    }

    /// Both halves, `2 * capacity` bytes.
    fn full(&self) -> &[u8] {
        match &self.region {
            #[cfg(target_os = "linux")]
            Region::Mapped(mapping) => mapping.as_slice(),
            Region::Heap(words) => {
                // SAFETY: the word vector holds at least 2 * capacity bytes.
                unsafe { std::slice::from_raw_parts(words.as_ptr().cast::<u8>(), 2 * self.capacity) }
            }
        }
    }

    fn full_mut(&mut self) -> &mut [u8] {
        let len = 2 * self.capacity;
        match &mut self.region {
            #[cfg(target_os = "linux")]
            Region::Mapped(mapping) => mapping.as_mut_slice(),
            Region::Heap(words) => {
                // SAFETY: as in `full`.
                unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), len) }
            }
        }
    }

    /// Copy `len` freshly written bytes at `start` into the other half.
    fn sync_mirror(&mut self, start: usize, len: usize) {
        let capacity = self.capacity;
        let end = start + len;
        let head = end.min(capacity) - start;
        let bytes = self.full_mut();

        bytes.copy_within(start..start + head, start + capacity);
        if end > capacity {
            bytes.copy_within(capacity..end, 0);
        }
    }
}

#[cfg(target_os = "linux")]
mod mapping {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::ptr::{self, NonNull};

    use crate::models::error::RingBufferError;

    /// One memfd object mapped twice, back to back. Both mappings are
    /// released together on drop.
    pub(super) struct DoubleMapping {
        base: NonNull<u8>,
        len: usize,
    }

    // SAFETY: the mapping is owned exclusively and only reached through
    // `&self`/`&mut self`.
    unsafe impl Send for DoubleMapping {}

    fn os_error(op: &'static str) -> RingBufferError {
        RingBufferError::Os {
            op,
            errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }
    }

    impl DoubleMapping {
        pub(super) fn new(capacity: usize) -> Result<Self, RingBufferError> {
            let len = 2 * capacity;

            // Reserve a free range big enough for both halves. It is never
            // touched and is fully replaced by the two fixed mappings below.
            // SAFETY: anonymous mapping with a kernel-chosen address.
            let reserved = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                    -1,
                    0,
                )
            };
            if reserved == libc::MAP_FAILED {
                return Err(os_error("mmap reserve"));
            }
            let base = NonNull::new(reserved.cast::<u8>()).ok_or(os_error("mmap reserve"))?;
            // From here on, drop unmaps the whole range on every error path.
            let mapping = Self { base, len };

            // SAFETY: name is NUL-terminated.
            let raw_fd = unsafe {
                libc::memfd_create(b"pitch-gauge-ring\0".as_ptr().cast(), libc::MFD_CLOEXEC)
            };
            if raw_fd < 0 {
                return Err(os_error("memfd_create"));
            }
            // SAFETY: fresh descriptor, owned by nobody else. The mappings
            // keep the memory object alive after it is closed.
            let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

            // SAFETY: valid descriptor.
            if unsafe { libc::ftruncate(fd.as_raw_fd(), capacity as libc::off_t) } != 0 {
                return Err(os_error("ftruncate"));
            }

            for half in 0..2 {
                // SAFETY: both targets lie inside the reservation we own.
                let expected = unsafe { base.as_ptr().add(half * capacity) }.cast::<libc::c_void>();
                let actual = unsafe {
                    libc::mmap(
                        expected,
                        capacity,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_SHARED | libc::MAP_FIXED,
                        fd.as_raw_fd(),
                        0,
                    )
                };
                if actual == libc::MAP_FAILED {
                    return Err(os_error("mmap mirror"));
                }
                if actual != expected {
                    return Err(RingBufferError::Misplaced {
                        expected: expected as usize,
                        actual: actual as usize,
                    });
                }
            }

            Ok(mapping)
        }

        pub(super) fn as_slice(&self) -> &[u8] {
            // SAFETY: `len` bytes are mapped readable for our lifetime.
            unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
        }

        pub(super) fn as_mut_slice(&mut self) -> &mut [u8] {
            // SAFETY: as above, and writable.
            unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
        }
    }

    impl Drop for DoubleMapping {
        fn drop(&mut self) {
            // SAFETY: we own exactly this range.
            if unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) } != 0 {
                log::warn!("munmap of ring buffer failed: {}", io::Error::last_os_error());
            }
        }
    }
}
