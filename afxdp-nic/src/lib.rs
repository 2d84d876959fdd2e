// Public modules and re-exports
pub mod backend;
pub mod error;
pub mod nic;
pub mod offsets;
pub mod pagemap;
pub mod pages;
pub mod pd;
pub mod ring;

pub use backend::HardwareOps;
pub use error::{Error, Result};
pub use nic::{AfXdpNic, NIC_FLAG_RX_ZEROCOPY, NicCaps, VI_RX_ZEROCOPY};
pub use offsets::{RingOffsets, RingsOffsets, XdpOffsets};
pub use pagemap::{PageLump, PageMap};
pub use pages::{PAGE_SHIFT, PAGE_SIZE, UMEM_BLOCK, UmemPages};
pub use pd::{BT_BLOCK_SIZE, BUFFER_TABLE_ORDERS, BufferTableBlock, MAX_PDS};

// Transport plumbing, mostly of interest to the backend itself
pub mod mmap;
pub mod redirect;
pub mod socket;
pub mod vi;

pub use ring::{RingKind, RingTransport, XdpDesc};
