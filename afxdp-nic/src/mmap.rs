//! Owned memory mappings for ring and umem backing regions.
//!
//! `OwnedMmap` holds a raw mapping and guarantees `munmap` on drop, so a VI
//! can keep its ring and umem regions alive exactly as long as the record
//! itself and release them in one place.

use std::{io, ptr};

use crate::error::{Error, Result};
use crate::pages::PAGE_SIZE;

#[derive(Debug)]
pub struct OwnedMmap {
    addr: *mut libc::c_void,
    len: usize,
}

impl OwnedMmap {
    /// A mapping of nothing; dropping it is a no-op.
    pub fn empty() -> Self {
        OwnedMmap {
            addr: ptr::null_mut(),
            len: 0,
        }
    }

    /// Maps a fresh zeroed anonymous region, length rounded up to whole
    /// pages.
    pub fn map_anon(len: usize) -> Result<Self> {
        let len = len.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        if len == 0 {
            return Err(Error::InvalidArgument("empty mapping"));
        }
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::last_os());
        }
        Ok(OwnedMmap { addr, len })
    }

    /// Maps `len` bytes of a descriptor ring from the transport at the
    /// given page offset, pre-faulted so the backing frames exist up front.
    pub fn map_ring(fd: libc::c_int, len: usize, pgoff: u64) -> Result<Self> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                pgoff as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::last_os());
        }
        Ok(OwnedMmap { addr, len })
    }

    pub fn addr(&self) -> u64 {
        self.addr as u64
    }

    pub fn as_mut_ptr(&self) -> *mut libc::c_void {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whole pages spanned by the mapping.
    pub fn pages(&self) -> usize {
        self.len.div_ceil(PAGE_SIZE)
    }
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        if !self.addr.is_null() && self.addr != libc::MAP_FAILED {
            let rc = unsafe { libc::munmap(self.addr, self.len) };
            if rc < 0 {
                log::error!("failed to unmap region: {}", io::Error::last_os_error());
            }
        }
    }
}
