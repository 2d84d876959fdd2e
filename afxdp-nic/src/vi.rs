//! Per-queue-instance (VI) state.
//!
//! A VI moves through `Unbound -> Configured -> Bound -> Unbound`: queue
//! configuration records the owner id and ring capacities before any socket
//! exists, the bind path fills in the socket, mappings and offsets, and
//! disable releases everything and zeroes the record. A present socket is
//! what "bound" means.

use crate::error::{Error, Result};
use crate::mmap::OwnedMmap;
use crate::offsets::{OffsetsPage, XdpOffsets};
use crate::pages::PAGE_SIZE;
use crate::socket::XdpSocket;

#[derive(Default)]
pub struct Vi {
    pub(crate) sock: Option<XdpSocket>,
    pub(crate) owner_id: u32,
    pub(crate) rxq_capacity: u32,
    pub(crate) txq_capacity: u32,
    pub(crate) flags: u16,
    pub(crate) kernel_offsets: XdpOffsets,
    pub(crate) user_offsets_page: Option<OffsetsPage>,
    pub(crate) umem_map: Option<OwnedMmap>,
    pub(crate) ring_maps: Vec<OwnedMmap>,
}

impl Vi {
    pub(crate) fn is_bound(&self) -> bool {
        self.sock.is_some()
    }

    /// Releases the socket, the offsets page and every mapping, and zeroes
    /// the record. Safe to call on an already released or never bound VI.
    pub(crate) fn release(&mut self) {
        *self = Vi::default();
    }
}

/// Validates the umem chunk geometry for the bind path: chunks must tile a
/// page exactly and leave room for the headroom.
pub fn validate_umem_geometry(chunk_size: u32, headroom: u32) -> Result<()> {
    if chunk_size == 0
        || chunk_size < headroom
        || chunk_size as usize > PAGE_SIZE
        || PAGE_SIZE % chunk_size as usize != 0
    {
        return Err(Error::InvalidArgument("bad umem chunk geometry"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_must_tile_the_page() {
        assert!(validate_umem_geometry(2048, 0).is_ok());
        assert!(validate_umem_geometry(4096, 0).is_ok());
        assert!(validate_umem_geometry(1024, 1024).is_ok());
        assert!(matches!(
            validate_umem_geometry(3000, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        assert!(validate_umem_geometry(0, 0).is_err());
        assert!(validate_umem_geometry(8192, 0).is_err());
        assert!(validate_umem_geometry(2048, 2049).is_err());
    }

    #[test]
    fn release_is_idempotent() {
        let mut vi = Vi {
            owner_id: 3,
            rxq_capacity: 512,
            ..Vi::default()
        };
        vi.release();
        assert!(!vi.is_bound());
        assert_eq!(vi.owner_id, 0);
        vi.release();
        assert!(!vi.is_bound());
    }
}
