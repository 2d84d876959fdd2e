//! AF_XDP socket transport.
//!
//! One `XdpSocket` backs one bound VI. It owns the raw socket descriptor
//! and implements the ring-builder's transport contract with plain
//! setsockopt/getsockopt/mmap calls, the same way the umem registration and
//! queue binding below are thin wrappers over the socket API.

use std::mem::size_of;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};

use crate::error::{Error, Result};
use crate::mmap::OwnedMmap;
use crate::pages::UmemPages;
use crate::ring::{RingFrames, RingKind, RingTransport};

pub struct XdpSocket {
    pub(crate) fd: OwnedFd,
}

impl XdpSocket {
    /// Creates the raw zero-copy socket. The socket lives in the network
    /// namespace of the calling process, which must match the device's so
    /// that interface indexes agree.
    pub fn create() -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_XDP, libc::SOCK_RAW | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(Error::last_os());
        }
        Ok(XdpSocket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Registers the domain's umem with the socket, sized to the current
    /// registry high-water mark. The returned backing mapping must stay
    /// alive as long as the socket is bound; the VI owns it.
    pub fn register_umem(
        &self,
        pages: &UmemPages,
        chunk_size: u32,
        headroom: u32,
    ) -> Result<OwnedMmap> {
        let map = OwnedMmap::map_anon(pages.mapped_len())?;

        // the struct grew a flags field in later kernels; zero what we
        // don't set
        let reg = unsafe {
            libc::xdp_umem_reg {
                addr: map.addr(),
                len: map.len() as u64,
                chunk_size,
                headroom,
                ..std::mem::zeroed()
            }
        };

        let rc = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                libc::SOL_XDP,
                libc::XDP_UMEM_REG,
                &reg as *const _ as *const libc::c_void,
                size_of::<libc::xdp_umem_reg>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::last_os());
        }
        Ok(map)
    }

    /// Binds the socket to one hardware queue of the interface. The queue
    /// index equals the VI instance number.
    pub fn bind_queue(&self, if_index: u32, queue_id: u32, flags: u16) -> Result<()> {
        let sxdp = libc::sockaddr_xdp {
            sxdp_family: libc::AF_XDP as libc::sa_family_t,
            sxdp_flags: flags,
            sxdp_ifindex: if_index,
            sxdp_queue_id: queue_id,
            sxdp_shared_umem_fd: 0,
        };

        let rc = unsafe {
            libc::bind(
                self.as_raw_fd(),
                &sxdp as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_xdp>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::last_os());
        }
        Ok(())
    }
}

impl RingTransport for XdpSocket {
    fn set_ring_capacity(&self, kind: RingKind, capacity: u32) -> Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                libc::SOL_XDP,
                kind.sockopt(),
                &capacity as *const _ as *const libc::c_void,
                size_of::<u32>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::last_os());
        }
        Ok(())
    }

    fn ring_layout(&self) -> Result<libc::xdp_mmap_offsets> {
        let mut offsets: libc::xdp_mmap_offsets = unsafe { std::mem::zeroed() };
        let mut optlen = size_of::<libc::xdp_mmap_offsets>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                libc::SOL_XDP,
                libc::XDP_MMAP_OFFSETS,
                &mut offsets as *mut _ as *mut libc::c_void,
                &mut optlen,
            )
        };
        if rc < 0 {
            return Err(Error::last_os());
        }
        Ok(offsets)
    }

    fn map_ring(&self, kind: RingKind, len: usize) -> Result<RingFrames> {
        let map = OwnedMmap::map_ring(self.as_raw_fd(), len, kind.pgoff())?;
        // in this address space the mapping itself is the frame view; the
        // pages persist as long as the guard does
        Ok(RingFrames {
            base: map.addr(),
            pages: map.pages(),
            guard: map,
        })
    }
}
