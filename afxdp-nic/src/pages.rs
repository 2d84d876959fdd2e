//! # Umem Page Registry
//!
//! ## Purpose
//!
//! Tracks the addresses of the user memory pages backing a protection
//! domain's packet buffers. AF_XDP has no hardware buffer table, so this
//! registry is the single source of truth for "which page backs linear
//! umem index N" — both the buffer-table emulation and the umem
//! registration path are layered on top of it.
//!
//! ## How it works
//!
//! Addresses live in fixed-size, separately boxed blocks indexed by
//! `index / UMEM_BLOCK` and `index % UMEM_BLOCK`. Growth appends whole
//! blocks and never relocates existing ones, so a pointer handed out to the
//! host page-backing service stays valid across later growth. Growth is
//! atomic with respect to `page_count`: the count only advances once every
//! block needed is secured, while blocks allocated before a failure stay in
//! the directory so teardown frees exactly what was acquired.

use crate::error::{Error, Result};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Address slots per registry block.
pub const UMEM_BLOCK: usize = PAGE_SIZE / size_of::<u64>();

static_assertions::const_assert!(UMEM_BLOCK.is_power_of_two());

type Block = Box<[u64]>;

/// A collection of all the user memory page addresses for a protection
/// domain. Addresses are opaque; 0 means "not set yet".
#[derive(Default)]
pub struct UmemPages {
    page_count: usize,
    used_page_count: usize,
    blocks: Vec<Block>,
}

fn alloc_block() -> Result<Block> {
    let mut block = Vec::new();
    block.try_reserve_exact(UMEM_BLOCK)?;
    block.resize(UMEM_BLOCK, 0);
    Ok(block.into_boxed_slice())
}

impl UmemPages {
    /// Makes `new_pages` further slots addressable, allocating blocks as
    /// needed. On failure the registry is unchanged except that blocks
    /// already allocated remain in the directory; the owning domain must
    /// then be torn down as a whole.
    pub fn grow(&mut self, new_pages: usize) -> Result<()> {
        let total = self
            .page_count
            .checked_add(new_pages)
            .ok_or(Error::OutOfMemory)?;
        let blocks = total.div_ceil(UMEM_BLOCK);

        if blocks > self.blocks.len() {
            self.blocks.try_reserve(blocks - self.blocks.len())?;
            while self.blocks.len() < blocks {
                self.blocks.push(alloc_block()?);
            }
        }

        self.page_count = total;
        Ok(())
    }

    /// Stores the address backing a page slot. The slot must already be
    /// addressable (`page < page_count`); the buffer-table emulation
    /// enforces that before calling.
    pub fn set(&mut self, page: usize, addr: u64) {
        self.blocks[page / UMEM_BLOCK][page % UMEM_BLOCK] = addr;
        if page >= self.used_page_count {
            self.used_page_count = page + 1;
        }
    }

    /// Address backing the page with the given linear index.
    pub fn get(&self, page: usize) -> u64 {
        self.blocks[page / UMEM_BLOCK][page % UMEM_BLOCK]
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// High-water mark of slots that have actually been set.
    pub fn used_page_count(&self) -> usize {
        self.used_page_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Byte length of the registered region, as seen by the transport.
    pub fn mapped_len(&self) -> usize {
        self.used_page_count << PAGE_SHIFT
    }
}
