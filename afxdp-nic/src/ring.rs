//! # Ring Builder
//!
//! ## Purpose
//!
//! Creates the four descriptor rings of a VI (receive, transmit, fill,
//! completion) on the socket transport and translates their layout into the
//! two offset records the rest of the system needs: kernel-relative
//! offsets for this backend, and page-map-relative offsets for the
//! user-space peer's own mapping of the same pages.
//!
//! ## How it works
//!
//! For each ring, capacity is negotiated first (it determines the mapped
//! size), then the ring's backing frames are mapped and registered into the
//! page-map as one lump. The transport's layout gives the byte offsets of
//! the producer index, consumer index and descriptor array within a ring
//! mapping; the builder rebases them once against the kernel-side base
//! address and once against the cumulative byte offset inside the exposed
//! page-map. All four rings are created sequentially and the whole
//! operation aborts at the first failure — lumps already registered stay
//! registered, and the owning VI's disable path is the single unwind point.

use crate::error::Result;
use crate::mmap::OwnedMmap;
use crate::offsets::{RingOffsets, RingsOffsets};
use crate::pagemap::PageMap;

/// Descriptor format of the rx and tx rings.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct XdpDesc {
    pub addr: u64,
    pub len: u32,
    pub options: u32,
}

static_assertions::const_assert_eq!(size_of::<XdpDesc>(), 16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    Rx,
    Tx,
    Fill,
    Completion,
}

impl RingKind {
    pub fn sockopt(self) -> libc::c_int {
        match self {
            RingKind::Rx => libc::XDP_RX_RING,
            RingKind::Tx => libc::XDP_TX_RING,
            RingKind::Fill => libc::XDP_UMEM_FILL_RING,
            RingKind::Completion => libc::XDP_UMEM_COMPLETION_RING,
        }
    }

    pub fn pgoff(self) -> u64 {
        match self {
            RingKind::Rx => libc::XDP_PGOFF_RX_RING as u64,
            RingKind::Tx => libc::XDP_PGOFF_TX_RING as u64,
            RingKind::Fill => libc::XDP_UMEM_PGOFF_FILL_RING,
            RingKind::Completion => libc::XDP_UMEM_PGOFF_COMPLETION_RING,
        }
    }

    pub fn desc_size(self) -> usize {
        match self {
            RingKind::Rx | RingKind::Tx => size_of::<XdpDesc>(),
            RingKind::Fill | RingKind::Completion => size_of::<u64>(),
        }
    }
}

/// The physical frames backing one mapped ring: the kernel-side address of
/// the first frame, the page count, and the mapping keeping them alive.
pub struct RingFrames {
    pub base: u64,
    pub pages: usize,
    pub guard: OwnedMmap,
}

/// What the builder needs from the underlying socket transport.
pub trait RingTransport {
    fn set_ring_capacity(&self, kind: RingKind, capacity: u32) -> Result<()>;
    fn ring_layout(&self) -> Result<libc::xdp_mmap_offsets>;
    fn map_ring(&self, kind: RingKind, len: usize) -> Result<RingFrames>;
}

fn build_ring<T: RingTransport + ?Sized>(
    transport: &T,
    page_map: &mut PageMap,
    kern_mem_base: u64,
    capacity: u32,
    kind: RingKind,
    layout: &libc::xdp_ring_offset,
    kern: &mut RingOffsets,
    user: &mut RingOffsets,
) -> Result<OwnedMmap> {
    let user_base = page_map.total_bytes() as u64;

    transport.set_ring_capacity(kind, capacity)?;

    let len = layout.desc as usize + (capacity as usize + 1) * kind.desc_size();
    let frames = transport.map_ring(kind, len)?;
    page_map.add_lump(frames.base, frames.pages);

    let kern_base = frames.base.wrapping_sub(kern_mem_base);
    kern.producer = kern_base + layout.producer;
    kern.consumer = kern_base + layout.consumer;
    kern.desc = kern_base + layout.desc;

    user.producer = user_base + layout.producer;
    user.consumer = user_base + layout.consumer;
    user.desc = user_base + layout.desc;

    Ok(frames.guard)
}

/// Creates all four rings in the fixed mapping order and fills both offset
/// records. Returns the mapping guards, which the VI must keep alive while
/// it is bound. The fill ring shares the rx capacity and the completion
/// ring the tx capacity.
pub fn build_rings<T: RingTransport + ?Sized>(
    transport: &T,
    page_map: &mut PageMap,
    kern_mem_base: u64,
    rxq_capacity: u32,
    txq_capacity: u32,
    kern: &mut RingsOffsets,
    user: &mut RingsOffsets,
) -> Result<Vec<OwnedMmap>> {
    let layout = transport.ring_layout()?;
    let mut guards = Vec::with_capacity(4);

    guards.push(build_ring(
        transport,
        page_map,
        kern_mem_base,
        rxq_capacity,
        RingKind::Rx,
        &layout.rx,
        &mut kern.rx,
        &mut user.rx,
    )?);
    guards.push(build_ring(
        transport,
        page_map,
        kern_mem_base,
        txq_capacity,
        RingKind::Tx,
        &layout.tx,
        &mut kern.tx,
        &mut user.tx,
    )?);
    guards.push(build_ring(
        transport,
        page_map,
        kern_mem_base,
        rxq_capacity,
        RingKind::Fill,
        &layout.fr,
        &mut kern.fr,
        &mut user.fr,
    )?);
    guards.push(build_ring(
        transport,
        page_map,
        kern_mem_base,
        txq_capacity,
        RingKind::Completion,
        &layout.cr,
        &mut kern.cr,
        &mut user.cr,
    )?);

    Ok(guards)
}
