//! Page-map handed to the mapping caller.
//!
//! The caller builds a single combined user-space mapping from this: the
//! VI's user-offsets page first, then the rx, tx, fill and completion rings
//! in that order. Each lump is a run of physically consecutive pages.

use crate::pages::PAGE_SHIFT;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLump {
    pub addr: u64,
    pub pages: usize,
}

#[derive(Default)]
pub struct PageMap {
    lumps: Vec<PageLump>,
    pages: usize,
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self, addr: u64) {
        self.add_lump(addr, 1);
    }

    pub fn add_lump(&mut self, addr: u64, pages: usize) {
        self.lumps.push(PageLump { addr, pages });
        self.pages += pages;
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Total byte size of the combined mapping so far. Also the offset at
    /// which the next lump will start.
    pub fn total_bytes(&self) -> usize {
        self.pages << PAGE_SHIFT
    }

    pub fn lumps(&self) -> &[PageLump] {
        &self.lumps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::PAGE_SIZE;

    #[test]
    fn lumps_accumulate_in_order() {
        let mut map = PageMap::new();
        map.add_page(0x1000);
        map.add_lump(0x8000, 3);
        assert_eq!(map.pages(), 4);
        assert_eq!(map.total_bytes(), 4 * PAGE_SIZE);
        assert_eq!(
            map.lumps(),
            &[
                PageLump {
                    addr: 0x1000,
                    pages: 1
                },
                PageLump {
                    addr: 0x8000,
                    pages: 3
                },
            ]
        );
    }
}
