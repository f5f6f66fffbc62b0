//! POSIX named shared memory segments.
//!
//! Thin `shm_open` + `mmap(MAP_SHARED)` wrapper around the fixed-size buffer
//! the signal channel exchanges messages through. The mapping is released on
//! drop; the name is only removed by an explicit `unlink`.

use std::ffi::CString;
use std::io;

use super::SHM_SIZE;
use crate::error::SignalError;

/// A mapped shared memory segment of `SHM_SIZE` bytes.
pub struct SharedSegment {
    ptr: *mut u8,
    len: usize,
}

impl SharedSegment {
    /// Creates the segment, or reopens it if it already exists, and sizes it.
    pub fn create(name: &str) -> Result<Self, SignalError> {
        let c_name = segment_name(name)?;
        // Safety: `c_name` is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(os_error("shm_open"));
        }
        // Safety: `fd` was just opened for writing.
        if unsafe { libc::ftruncate(fd, SHM_SIZE as libc::off_t) } != 0 {
            let err = os_error("ftruncate");
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Self::map(fd)
    }

    /// Opens an existing segment.
    ///
    /// Returns `Ok(None)` if no segment with that name exists or if it has not
    /// been sized yet.
    pub fn open(name: &str) -> Result<Option<Self>, SignalError> {
        let c_name = segment_name(name)?;
        // Safety: `c_name` is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(None);
            }
            return Err(SignalError::Os {
                op: "shm_open",
                source: err,
            });
        }

        // Safety: `stat` is fully written by fstat on success.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } != 0 {
            let err = os_error("fstat");
            unsafe { libc::close(fd) };
            return Err(err);
        }
        if (stat.st_size as usize) < SHM_SIZE {
            unsafe { libc::close(fd) };
            return Ok(None);
        }
        Self::map(fd).map(Some)
    }

    fn map(fd: libc::c_int) -> Result<Self, SignalError> {
        // Safety: `fd` refers to a shared memory object of at least SHM_SIZE
        // bytes. The descriptor is not needed once the mapping exists.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                SHM_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        let mapped = if ptr == libc::MAP_FAILED {
            Err(os_error("mmap"))
        } else {
            Ok(Self {
                ptr: ptr as *mut u8,
                len: SHM_SIZE,
            })
        };
        unsafe { libc::close(fd) };
        mapped
    }

    /// Zero-fills the buffer, then writes `data` at its start.
    pub fn write(&mut self, data: &[u8]) -> Result<(), SignalError> {
        if data.len() >= self.len {
            return Err(SignalError::TooLarge {
                size: data.len(),
                limit: self.len,
            });
        }
        // Safety: the mapping is `len` bytes long and `data` is shorter.
        unsafe {
            std::ptr::write_bytes(self.ptr, 0, self.len);
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr, data.len());
        }
        Ok(())
    }

    /// Reads the buffer with trailing NUL bytes removed.
    pub fn read(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len];
        // Safety: the mapping is `len` bytes long.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr, buf.as_mut_ptr(), self.len) };
        let end = buf.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        buf.truncate(end);
        buf
    }

    pub fn read_string(&self) -> String {
        String::from_utf8_lossy(&self.read()).into_owned()
    }

    /// Removes a segment name. A missing segment is not an error.
    pub fn unlink(name: &str) -> Result<(), SignalError> {
        let c_name = segment_name(name)?;
        // Safety: `c_name` is a valid NUL-terminated string.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(SignalError::Os {
                    op: "shm_unlink",
                    source: err,
                });
            }
        }
        Ok(())
    }

    /// Returns `true` if a segment with this name exists.
    pub fn exists(name: &str) -> bool {
        matches!(Self::open(name), Ok(Some(_)))
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        // Safety: `ptr` and `len` come from a successful mmap.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

fn segment_name(name: &str) -> Result<CString, SignalError> {
    let posix = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    };
    CString::new(posix).map_err(|e| SignalError::Os {
        op: "shm_open",
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })
}

fn os_error(op: &'static str) -> SignalError {
    SignalError::Os {
        op,
        source: io::Error::last_os_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_trims_padding() {
        let name = format!("gema_shm_test_{}", std::process::id());
        let mut segment = SharedSegment::create(&name).unwrap();
        segment.write(b"{\"id\": 1}").unwrap();
        assert_eq!(segment.read_string(), "{\"id\": 1}");

        let reopened = SharedSegment::open(&name).unwrap().unwrap();
        assert_eq!(reopened.read(), b"{\"id\": 1}".to_vec());

        SharedSegment::unlink(&name).unwrap();
        assert!(SharedSegment::open(&name).unwrap().is_none());
    }

    #[test]
    fn rejects_data_filling_the_buffer() {
        let name = format!("gema_shm_full_{}", std::process::id());
        let mut segment = SharedSegment::create(&name).unwrap();
        let data = vec![b'x'; SHM_SIZE];
        assert!(matches!(
            segment.write(&data),
            Err(SignalError::TooLarge { .. })
        ));
        SharedSegment::unlink(&name).unwrap();
    }
}
