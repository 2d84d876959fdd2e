//! # Packet Redirect Map and Classifier
//!
//! ## Purpose
//!
//! Device-wide plumbing that steers inbound packets into the zero-copy
//! sockets: an XSKMAP with one slot per queue, and a minimal XDP classifier
//! that redirects TCP/UDP packets whose ingress queue has a registered
//! socket and passes everything else to the kernel stack.
//!
//! ## How it works
//!
//! The classifier is a fixed, pre-compiled instruction sequence — an opaque
//! versioned artifact, not compiled at runtime. The map's file descriptor
//! must appear as the immediate operand of the two map-load instructions,
//! so loading patches it into those fixed slots and hands the result to the
//! raw program-load call. The program is then attached to the interface;
//! any failure on the way releases everything acquired so far, so a partial
//! attachment is never left live.

use std::ffi::CString;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};
use std::{io, ptr};

use crate::error::{Error, Result};

/// The compiled classifier. Each `lddw` loading the socket map occupies two
/// instruction slots; the map fd goes into the immediate field (the upper
/// 32 bits) of the first slot of each pair.
const CLASSIFIER: [u64; 31] = [
    0x00000002000000b7,
    0x0000000000041361,
    0x0000000000001261,
    0x00000000000024bf,
    0x0000002200000407,
    0x000000000018342d,
    0x00000017000003b7,
    0x00000000000c2469,
    0x0000000800020415,
    0x0000dd8600140455,
    0x00000014000003b7,
    0x000000000000320f,
    0x0000000000002271,
    0x0000001100010215,
    0x00000006000f0255,
    0x0000000000101161,
    0x00000000fffc1a63,
    0x000000000000a2bf,
    0xfffffffc00000207,
    0x0000000000001118,
    0x0000000000000000,
    0x0000000100000085,
    0x00000000000001bf,
    0x00000002000000b7,
    0x0000000000050115,
    0x00000000fffca261,
    0x0000000000001118,
    0x0000000000000000,
    0x00000000000003b7,
    0x0000003300000085,
    0x0000000000000095,
];

/// Positions of the two map-load instructions within [`CLASSIFIER`].
const MAP_FD_SLOTS: [usize; 2] = [19, 26];

/// Returns the classifier with the socket map's descriptor patched into
/// both immediate-operand positions.
pub fn patch_classifier(map_fd: RawFd) -> [u64; 31] {
    let mut insns = CLASSIFIER;
    for slot in MAP_FD_SLOTS {
        insns[slot] |= (map_fd as u32 as u64) << 32;
    }
    insns
}

/// The device-wide socket map with its classifier attached to the
/// interface. Dropping it detaches the program and releases the map.
pub struct RedirectMap {
    pub(crate) if_index: u32,
    pub(crate) map: OwnedFd,
    pub(crate) prog: OwnedFd,
}

impl RedirectMap {
    /// Creates the map, loads the patched classifier and attaches it to
    /// the interface. `max_entries` is the device's queue limit; slot keys
    /// are queue indexes.
    pub fn install(if_index: u32, max_entries: u32) -> Result<Self> {
        let map_name = CString::new("afxdp_xsks").map_err(io::Error::other)?;
        let map_fd = unsafe {
            libbpf_sys::bpf_map_create(
                libbpf_sys::BPF_MAP_TYPE_XSKMAP,
                map_name.as_ptr(),
                size_of::<u32>() as u32,
                size_of::<u32>() as u32,
                max_entries,
                ptr::null(),
            )
        };
        if map_fd < 0 {
            return Err(Error::last_os());
        }
        let map = unsafe { OwnedFd::from_raw_fd(map_fd) };

        let insns = patch_classifier(map.as_raw_fd());
        let prog_name = CString::new("xdpsock").map_err(io::Error::other)?;
        let license = CString::new("GPL").map_err(io::Error::other)?;
        let prog_fd = unsafe {
            libbpf_sys::bpf_prog_load(
                libbpf_sys::BPF_PROG_TYPE_XDP,
                prog_name.as_ptr(),
                license.as_ptr(),
                insns.as_ptr() as *const libbpf_sys::bpf_insn,
                insns.len() as libbpf_sys::size_t,
                ptr::null_mut(),
            )
        };
        if prog_fd < 0 {
            return Err(Error::last_os());
        }
        let prog = unsafe { OwnedFd::from_raw_fd(prog_fd) };

        let rc = unsafe {
            libbpf_sys::bpf_xdp_attach(
                if_index as libc::c_int,
                prog.as_raw_fd(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(Error::Os(io::Error::from_raw_os_error(-rc)));
        }

        Ok(RedirectMap {
            if_index,
            map,
            prog,
        })
    }

    /// Installs a socket into the slot for one queue, making the
    /// classifier redirect that queue's packets to it.
    pub fn set_slot(&self, queue: u32, sock_fd: RawFd) -> Result<()> {
        let value = sock_fd as u32;
        let rc = unsafe {
            libbpf_sys::bpf_map_update_elem(
                self.map.as_raw_fd(),
                &queue as *const _ as *const libc::c_void,
                &value as *const _ as *const libc::c_void,
                0,
            )
        };
        if rc < 0 {
            return Err(Error::Os(io::Error::from_raw_os_error(-rc)));
        }
        Ok(())
    }
}

impl Drop for RedirectMap {
    fn drop(&mut self) {
        let rc = unsafe { libbpf_sys::bpf_xdp_detach(self.if_index as libc::c_int, 0, ptr::null()) };
        if rc < 0 {
            log::debug!(
                "failed to detach classifier from ifindex {}: {}",
                self.if_index,
                io::Error::from_raw_os_error(-rc)
            );
        }
    }
}
