//! # Protection Domains and Buffer-Table Emulation
//!
//! ## Purpose
//!
//! The generic caller expects a hardware buffer table: opaque blocks of
//! pages it can allocate, point at physical addresses, and free. AF_XDP has
//! no such table, so "allocation" here is pure address-space bookkeeping on
//! top of the owner's [`UmemPages`] registry — a block is just a fresh
//! range of registry slots, and its base address is the byte offset at
//! which those slots begin.
//!
//! ## How it works
//!
//! Domains live in a fixed table indexed by owner id; a zeroed entry is an
//! empty domain, so the first allocation against an owner implicitly
//! creates it. The block handle is a small tagged value carrying
//! `{owner, order, base}` — enough to find the right domain and page range
//! without any auxiliary lookup. Reclamation is count-based: the domain is
//! torn down exactly when every block ever allocated for the owner has been
//! freed, never earlier.

use crate::error::{Error, Result};
use crate::pages::{PAGE_SHIFT, PAGE_SIZE, UmemPages};

/// Hard cap on concurrently usable owner ids.
pub const MAX_PDS: usize = 256;

/// Buffer-table entries per allocated block.
pub const BT_BLOCK_SIZE: usize = 32;

/// Owner ids representable by the block handle. The original encoding
/// packed the order into the handle's low bits, which bounds the owner id;
/// the tagged handle keeps the same capacity limit.
const MAX_OWNER: u32 = 1 << 24;

/// Orders supported by the emulated table.
pub const BUFFER_TABLE_ORDERS: &[u32] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

#[derive(Default)]
pub struct ProtectionDomain {
    pub(crate) umem: UmemPages,
    buffer_table_count: u64,
    freed_buffer_table_count: u64,
}

/// Opaque handle for one allocated buffer-table block.
///
/// `base` is the block's virtual buffer-table address: the byte offset
/// within the owner's umem address space at which its pages begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTableBlock {
    pub owner: u32,
    pub order: u32,
    pub base: u64,
}

/// All protection domains of one device, indexed by owner id.
pub struct PdTable {
    pd: Vec<ProtectionDomain>,
}

impl PdTable {
    pub fn new() -> Self {
        PdTable {
            pd: (0..MAX_PDS).map(|_| ProtectionDomain::default()).collect(),
        }
    }

    pub(crate) fn by_owner(&mut self, owner: u32) -> Option<&mut ProtectionDomain> {
        self.pd.get_mut(owner as usize)
    }

    /// Allocates a block of `BT_BLOCK_SIZE << order` fresh, unaddressed
    /// pages in the owner's domain.
    pub fn alloc(&mut self, owner: u32, order: u32) -> Result<BufferTableBlock> {
        if owner >= MAX_OWNER {
            return Err(Error::NoSpace);
        }
        let pd = self.by_owner(owner).ok_or(Error::NotFound)?;

        let block = BufferTableBlock {
            owner,
            order,
            base: (pd.umem.page_count() as u64) << PAGE_SHIFT,
        };

        pd.umem.grow(BT_BLOCK_SIZE << order)?;
        pd.buffer_table_count += 1;

        Ok(block)
    }

    /// Points buffer-table entries at their backing addresses.
    ///
    /// Each entry spans `1 << order` registry pages and `dma_addrs` holds
    /// one base address per entry; consecutive single pages within an entry
    /// step by `PAGE_SIZE`. The implied page range is validated against the
    /// registry before anything is written, so a block whose domain was
    /// concurrently reset (or a caller error) fails without partial writes.
    pub fn set(
        &mut self,
        block: &BufferTableBlock,
        first_entry: usize,
        dma_addrs: &[u64],
    ) -> Result<()> {
        let order = block.order;
        let pd = self.by_owner(block.owner).ok_or(Error::NotFound)?;

        let mut page = (block.base >> PAGE_SHIFT) as usize + (first_entry << order);
        if page + (dma_addrs.len() << order) > pd.umem.page_count() {
            return Err(Error::InvalidArgument("entry range exceeds registry"));
        }

        for &dma_addr in dma_addrs {
            for j in 0..1usize << order {
                pd.umem.set(page, dma_addr + (j * PAGE_SIZE) as u64);
                page += 1;
            }
        }
        Ok(())
    }

    /// Releases one block. Only the last outstanding free for an owner
    /// tears the domain down; earlier frees just update the accounting.
    pub fn free(&mut self, block: BufferTableBlock) -> Result<()> {
        let owner = block.owner;
        let pd = self.by_owner(owner).ok_or(Error::NotFound)?;
        debug_assert!(pd.freed_buffer_table_count < pd.buffer_table_count);

        pd.freed_buffer_table_count += 1;
        if pd.freed_buffer_table_count == pd.buffer_table_count {
            log::debug!("all blocks freed, resetting protection domain {owner}");
            *pd = ProtectionDomain::default();
        }
        Ok(())
    }

    /// The emulation has no separate clear concept; addresses are simply
    /// never read until legitimately set again.
    pub fn clear(&mut self, _block: &BufferTableBlock, _first_entry: usize, _n_entries: usize) {}
}

impl Default for PdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_extends_registry_by_block_size_shifted() {
        let mut table = PdTable::new();

        let b0 = table.alloc(5, 0).unwrap();
        assert_eq!(b0.base, 0);
        let pages = table.by_owner(5).unwrap().umem.page_count();
        assert_eq!(pages, BT_BLOCK_SIZE);

        let b1 = table.alloc(5, 1).unwrap();
        assert_eq!(b1.base, (BT_BLOCK_SIZE as u64) << PAGE_SHIFT);
        // base is aligned to 1 << order registry pages
        assert_eq!((b1.base >> PAGE_SHIFT) % (1 << b1.order), 0);
        let pages = table.by_owner(5).unwrap().umem.page_count();
        assert_eq!(pages, BT_BLOCK_SIZE + (BT_BLOCK_SIZE << 1));
    }

    #[test]
    fn owner_bounds() {
        let mut table = PdTable::new();
        assert!(matches!(table.alloc(MAX_OWNER, 0), Err(Error::NoSpace)));
        assert!(matches!(
            table.alloc(MAX_PDS as u32, 0),
            Err(Error::NotFound)
        ));
        assert!(table.alloc(MAX_PDS as u32 - 1, 0).is_ok());
    }

    #[test]
    fn set_writes_one_address_per_page() {
        let mut table = PdTable::new();
        let block = table.alloc(1, 1).unwrap();

        table.set(&block, 2, &[0x10_0000, 0x20_0000]).unwrap();

        let pd = table.by_owner(1).unwrap();
        // entry 2 of an order-1 block starts at page 4
        assert_eq!(pd.umem.get(4), 0x10_0000);
        assert_eq!(pd.umem.get(5), 0x10_0000 + PAGE_SIZE as u64);
        assert_eq!(pd.umem.get(6), 0x20_0000);
        assert_eq!(pd.umem.get(7), 0x20_0000 + PAGE_SIZE as u64);
        assert_eq!(pd.umem.get(3), 0);
    }

    #[test]
    fn set_out_of_range_fails_without_partial_writes() {
        let mut table = PdTable::new();
        let block = table.alloc(1, 0).unwrap();

        let addrs: Vec<u64> = (0..BT_BLOCK_SIZE as u64 + 1).map(|i| (i + 1) << 20).collect();
        assert!(matches!(
            table.set(&block, 0, &addrs),
            Err(Error::InvalidArgument(_))
        ));

        let pd = table.by_owner(1).unwrap();
        for page in 0..pd.umem.page_count() {
            assert_eq!(pd.umem.get(page), 0);
        }
    }

    #[test]
    fn domain_resets_only_after_last_free_in_any_order() {
        let mut table = PdTable::new();
        let b0 = table.alloc(5, 0).unwrap();
        let b1 = table.alloc(5, 1).unwrap();
        table.set(&b0, 0, &[0x1000]).unwrap();

        table.free(b1).unwrap();
        // still alive after the first free
        assert!(table.by_owner(5).unwrap().umem.page_count() > 0);
        assert_eq!(table.by_owner(5).unwrap().umem.get(0), 0x1000);

        table.free(b0).unwrap();
        assert_eq!(table.by_owner(5).unwrap().umem.page_count(), 0);

        // owner id is reusable afterwards
        let again = table.alloc(5, 0).unwrap();
        assert_eq!(again.base, 0);
    }

    #[test]
    fn clear_is_a_no_op() {
        let mut table = PdTable::new();
        let block = table.alloc(0, 0).unwrap();
        table.set(&block, 0, &[0x4000]).unwrap();
        table.clear(&block, 0, 1);
        assert_eq!(table.by_owner(0).unwrap().umem.get(0), 0x4000);
    }
}
