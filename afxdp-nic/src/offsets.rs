//! Ring offset records published to the two consumers of a VI.
//!
//! Two parallel copies of the same record exist per VI: one with offsets
//! relative to a kernel-side base address (used by this backend to touch the
//! rings directly) and one relative to the cumulative byte offset within the
//! exposed page-map (used by the user-space peer to compute pointers into
//! its own combined mapping of the same pages). The user copy is written
//! verbatim at the start of the VI's user-offsets page, so the layout is
//! fixed.

use std::ptr;

use crate::error::Result;
use crate::mmap::OwnedMmap;
use crate::pages::PAGE_SIZE;

/// Byte offsets to the live parts of one ring.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RingOffsets {
    pub producer: u64,
    pub consumer: u64,
    pub desc: u64,
}

/// Offsets for all four rings, in the fixed mapping order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RingsOffsets {
    pub rx: RingOffsets,
    pub tx: RingOffsets,
    pub fr: RingOffsets,
    pub cr: RingOffsets,
}

/// The complete record a VI publishes: ring offsets plus the total byte
/// size of everything the page-map exposes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XdpOffsets {
    pub rings: RingsOffsets,
    pub mmap_bytes: u64,
}

static_assertions::const_assert!(size_of::<XdpOffsets>() <= PAGE_SIZE);

/// One zeroed page owned by a VI, exposed through the page-map so the
/// user-space peer can read the offsets record without sharing any virtual
/// address with this backend.
pub struct OffsetsPage {
    map: OwnedMmap,
}

impl OffsetsPage {
    pub fn alloc() -> Result<Self> {
        Ok(OffsetsPage {
            map: OwnedMmap::map_anon(PAGE_SIZE)?,
        })
    }

    pub fn addr(&self) -> u64 {
        self.map.addr()
    }

    /// Writes the record at its well-known location, the start of the page.
    pub fn publish(&mut self, offsets: &XdpOffsets) {
        unsafe { ptr::write(self.map.as_mut_ptr() as *mut XdpOffsets, *offsets) }
    }
}
