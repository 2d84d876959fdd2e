//! The hardware-ops contract consumed by the generic NIC abstraction.
//!
//! Every NIC backend exposes the same function table; the AF_XDP backend
//! implements the subset that maps onto the socket transport and fails the
//! rest cleanly. Operations a backend cannot support return
//! [`Error::Unsupported`](crate::Error::Unsupported) (after a diagnostic
//! log) rather than pretending; the license surface returns its fixed
//! "not licensed, not an error" stubs.

use std::os::fd::RawFd;

use crate::error::Result;
use crate::offsets::XdpOffsets;
use crate::pagemap::PageMap;
use crate::pd::BufferTableBlock;

pub trait HardwareOps {
    // device lifecycle
    fn init_hardware(&mut self, mac_addr: [u8; 6]) -> Result<()>;
    fn tweak_hardware(&mut self);
    fn release_hardware(&mut self);

    // event queues
    fn event_queue_enable(&mut self, evq: usize, evq_size: u32) -> Result<u32>;
    fn event_queue_disable(&mut self, evq: usize);
    fn wakeup_request(&self, vi_id: usize, rptr: u32);
    fn sw_event(&mut self, data: u32, evq: usize);
    fn handle_event(&mut self) -> Result<()>;

    // DMA queues
    fn dmaq_tx_q_init(&mut self, evq_id: usize, owner_id: u32, capacity: u32) -> Result<()>;
    fn dmaq_rx_q_init(
        &mut self,
        evq_id: usize,
        owner_id: u32,
        capacity: u32,
        flags: u32,
    ) -> Result<()>;
    fn dmaq_tx_q_disable(&mut self, dmaq: usize);
    fn dmaq_rx_q_disable(&mut self, dmaq: usize);
    fn flush_tx_dma_channel(&mut self, dmaq: usize) -> Result<()>;
    fn flush_rx_dma_channel(&mut self, dmaq: usize) -> Result<()>;

    // buffer table
    fn buffer_table_orders(&self) -> &'static [u32];
    fn buffer_table_alloc(&mut self, owner: u32, order: u32) -> Result<BufferTableBlock>;
    fn buffer_table_realloc(
        &mut self,
        owner: u32,
        order: u32,
        block: &BufferTableBlock,
    ) -> Result<()>;
    fn buffer_table_free(&mut self, block: BufferTableBlock) -> Result<()>;
    fn buffer_table_set(
        &mut self,
        block: &BufferTableBlock,
        first_entry: usize,
        dma_addrs: &[u64],
    ) -> Result<()>;
    fn buffer_table_clear(&mut self, block: &BufferTableBlock, first_entry: usize, n_entries: usize);

    // port sniff
    fn set_port_sniff(
        &mut self,
        instance: usize,
        enable: bool,
        promiscuous: bool,
        rss_context: u32,
    ) -> Result<()>;
    fn set_tx_port_sniff(&mut self, instance: usize, enable: bool, rss_context: u32) -> Result<()>;

    // licensing
    fn license_check(&mut self, feature: u32) -> Result<bool>;
    fn license_challenge(&mut self, feature: u32, challenge: &[u8]) -> Result<()>;
    fn v3_license_check(&mut self, app_id: u64) -> Result<bool>;
    fn v3_license_challenge(&mut self, app_id: u64, challenge: &[u8]) -> Result<()>;

    // stats and TX alternatives
    fn get_rx_error_stats(&mut self, instance: usize) -> Result<()>;
    fn tx_alt_alloc(&mut self, txq: usize, num_alt: usize, num_32b_words: usize) -> Result<()>;
    fn tx_alt_free(&mut self, num_alt: usize, cp_id: u32) -> Result<()>;

    // VI surface
    fn vi_mem(&self, instance: usize) -> Option<&XdpOffsets>;
    fn vi_init(
        &mut self,
        instance: usize,
        chunk_size: u32,
        headroom: u32,
        page_map: &mut PageMap,
    ) -> Result<RawFd>;
}
