//! # AF_XDP Device Backend
//!
//! ## Purpose
//!
//! Ties the pieces together behind the hardware-ops contract: one
//! [`AfXdpNic`] per network device owns the redirect map, the per-queue VI
//! records and the protection-domain table, and drives their lifecycles
//! from the generic calls.
//!
//! ## How it works
//!
//! `init_hardware` sets up the device-wide state once; per-queue
//! configuration records owner and capacities on a VI; `vi_init` performs
//! the bind: socket, user-offsets page, umem registration, the four rings,
//! the redirect slot and the queue bind, in that order, aborting at the
//! first failure. `event_queue_disable` is the per-queue unwind point and
//! releases a VI unconditionally. Operations with no AF_XDP equivalent
//! fail with `Unsupported` after a diagnostic log; the license surface
//! returns fixed non-error stubs.

use std::os::fd::RawFd;

use crate::backend::HardwareOps;
use crate::error::{Error, Result};
use crate::offsets::{OffsetsPage, XdpOffsets};
use crate::pagemap::PageMap;
use crate::pd::{BUFFER_TABLE_ORDERS, BufferTableBlock, PdTable};
use crate::redirect::RedirectMap;
use crate::ring::build_rings;
use crate::socket::XdpSocket;
use crate::vi::{Vi, validate_umem_geometry};

/// Capability flags reported through [`NicCaps`].
pub const NIC_FLAG_RX_ZEROCOPY: u32 = 1 << 0;

/// RX queue-init request flag asking for zero-copy mode.
pub const VI_RX_ZEROCOPY: u32 = 1 << 0;

/// Hardware capabilities as seen by the generic caller. AF_XDP has none of
/// the PIO or TX-alternative machinery, so everything except the zero-copy
/// flag stays zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NicCaps {
    pub pio_num: u32,
    pub pio_size: u32,
    pub tx_alts_vfifos: u32,
    pub tx_alts_cp_bufs: u32,
    pub tx_alts_cp_buf_size: u32,
    pub rx_variant: u32,
    pub tx_variant: u32,
    pub rx_prefix_len: u32,
    pub flags: u32,
}

/// Device-wide AF_XDP state, created by `init_hardware`.
pub(crate) struct AfXdpState {
    pub(crate) redirect: RedirectMap,
    pub(crate) vi: Vec<Vi>,
    pub(crate) pd: PdTable,
}

/// One emulated NIC bound to a network interface.
pub struct AfXdpNic {
    pub(crate) if_index: u32,
    pub(crate) vi_lim: usize,
    pub(crate) mac_addr: [u8; 6],
    pub(crate) caps: NicCaps,
    pub(crate) xdp: Option<AfXdpState>,
}

impl AfXdpNic {
    /// A device shell for the given interface; `init_hardware` arms it.
    pub fn new(if_index: u32, vi_lim: usize) -> Self {
        AfXdpNic {
            if_index,
            vi_lim,
            mac_addr: [0; 6],
            caps: NicCaps::default(),
            xdp: None,
        }
    }

    pub fn mac_addr(&self) -> [u8; 6] {
        self.mac_addr
    }

    pub fn caps(&self) -> &NicCaps {
        &self.caps
    }

    fn state_mut(&mut self) -> Result<&mut AfXdpState> {
        self.xdp.as_mut().ok_or(Error::NotFound)
    }

    fn vi_mut(&mut self, instance: usize) -> Result<&mut Vi> {
        self.state_mut()?.vi.get_mut(instance).ok_or(Error::NotFound)
    }
}

impl HardwareOps for AfXdpNic {
    fn init_hardware(&mut self, mac_addr: [u8; 6]) -> Result<()> {
        if self.xdp.is_some() {
            return Err(Error::Busy);
        }

        let redirect = RedirectMap::install(self.if_index, self.vi_lim as u32)?;
        self.xdp = Some(AfXdpState {
            redirect,
            vi: (0..self.vi_lim).map(|_| Vi::default()).collect(),
            pd: PdTable::new(),
        });
        self.mac_addr = mac_addr;
        self.tweak_hardware();
        Ok(())
    }

    fn tweak_hardware(&mut self) {
        self.caps = NicCaps {
            flags: NIC_FLAG_RX_ZEROCOPY,
            ..NicCaps::default()
        };
    }

    /// Releases the classifier and map. VIs and domains must already have
    /// been quiesced through the per-queue disable path.
    fn release_hardware(&mut self) {
        self.xdp = None;
    }

    fn event_queue_enable(&mut self, evq: usize, evq_size: u32) -> Result<u32> {
        // no event queues to arm; accepted as a fixed stub
        log::debug!("event queue {evq} size {evq_size}: nothing to enable on AF_XDP");
        Ok(0)
    }

    fn event_queue_disable(&mut self, evq: usize) {
        if let Ok(vi) = self.vi_mut(evq) {
            vi.release();
        }
    }

    fn wakeup_request(&self, _vi_id: usize, _rptr: u32) {}

    fn sw_event(&mut self, data: u32, evq: usize) {
        log::debug!("software event {data} for evq {evq} not supported on AF_XDP");
    }

    fn handle_event(&mut self) -> Result<()> {
        log::debug!("event handling not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn dmaq_tx_q_init(&mut self, evq_id: usize, owner_id: u32, capacity: u32) -> Result<()> {
        let vi = self.vi_mut(evq_id)?;
        vi.owner_id = owner_id;
        vi.txq_capacity = capacity;
        Ok(())
    }

    fn dmaq_rx_q_init(
        &mut self,
        evq_id: usize,
        owner_id: u32,
        capacity: u32,
        flags: u32,
    ) -> Result<()> {
        let vi = self.vi_mut(evq_id)?;
        vi.owner_id = owner_id;
        vi.rxq_capacity = capacity;
        vi.flags |= if flags & VI_RX_ZEROCOPY != 0 {
            libc::XDP_ZEROCOPY
        } else {
            libc::XDP_COPY
        };
        Ok(())
    }

    fn dmaq_tx_q_disable(&mut self, dmaq: usize) {
        log::debug!("tx queue {dmaq} disable: nothing to do on AF_XDP");
    }

    fn dmaq_rx_q_disable(&mut self, dmaq: usize) {
        log::debug!("rx queue {dmaq} disable: nothing to do on AF_XDP");
    }

    fn flush_tx_dma_channel(&mut self, dmaq: usize) -> Result<()> {
        log::debug!("tx flush for queue {dmaq} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn flush_rx_dma_channel(&mut self, dmaq: usize) -> Result<()> {
        log::debug!("rx flush for queue {dmaq} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn buffer_table_orders(&self) -> &'static [u32] {
        BUFFER_TABLE_ORDERS
    }

    fn buffer_table_alloc(&mut self, owner: u32, order: u32) -> Result<BufferTableBlock> {
        self.state_mut()?.pd.alloc(owner, order)
    }

    fn buffer_table_realloc(
        &mut self,
        owner: u32,
        _order: u32,
        _block: &BufferTableBlock,
    ) -> Result<()> {
        log::debug!("buffer table realloc for owner {owner} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn buffer_table_free(&mut self, block: BufferTableBlock) -> Result<()> {
        self.state_mut()?.pd.free(block)
    }

    fn buffer_table_set(
        &mut self,
        block: &BufferTableBlock,
        first_entry: usize,
        dma_addrs: &[u64],
    ) -> Result<()> {
        self.state_mut()?.pd.set(block, first_entry, dma_addrs)
    }

    fn buffer_table_clear(
        &mut self,
        block: &BufferTableBlock,
        first_entry: usize,
        n_entries: usize,
    ) {
        if let Ok(state) = self.state_mut() {
            state.pd.clear(block, first_entry, n_entries);
        }
    }

    fn set_port_sniff(
        &mut self,
        instance: usize,
        _enable: bool,
        _promiscuous: bool,
        _rss_context: u32,
    ) -> Result<()> {
        log::debug!("port sniff on instance {instance} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn set_tx_port_sniff(&mut self, instance: usize, _enable: bool, _rss_context: u32) -> Result<()> {
        log::debug!("tx port sniff on instance {instance} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn license_check(&mut self, feature: u32) -> Result<bool> {
        log::debug!("license check for feature {feature}: no licensing on AF_XDP");
        Ok(false)
    }

    fn license_challenge(&mut self, feature: u32, _challenge: &[u8]) -> Result<()> {
        log::debug!("license challenge for feature {feature}: no licensing on AF_XDP");
        Ok(())
    }

    fn v3_license_check(&mut self, app_id: u64) -> Result<bool> {
        log::debug!("v3 license check for app {app_id}: no licensing on AF_XDP");
        Ok(false)
    }

    fn v3_license_challenge(&mut self, app_id: u64, _challenge: &[u8]) -> Result<()> {
        log::debug!("v3 license challenge for app {app_id}: no licensing on AF_XDP");
        Ok(())
    }

    fn get_rx_error_stats(&mut self, instance: usize) -> Result<()> {
        log::debug!("rx error stats for instance {instance} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn tx_alt_alloc(&mut self, txq: usize, _num_alt: usize, _num_32b_words: usize) -> Result<()> {
        log::debug!("tx alternatives on queue {txq} not supported on AF_XDP");
        Err(Error::Unsupported)
    }

    fn tx_alt_free(&mut self, _num_alt: usize, _cp_id: u32) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn vi_mem(&self, instance: usize) -> Option<&XdpOffsets> {
        self.xdp
            .as_ref()
            .and_then(|xdp| xdp.vi.get(instance))
            .map(|vi| &vi.kernel_offsets)
    }

    fn vi_init(
        &mut self,
        instance: usize,
        chunk_size: u32,
        headroom: u32,
        page_map: &mut PageMap,
    ) -> Result<RawFd> {
        validate_umem_geometry(chunk_size, headroom)?;

        let if_index = self.if_index;
        let AfXdpState { redirect, vi, pd } = self.state_mut()?;
        let vi = vi.get_mut(instance).ok_or(Error::NotFound)?;
        if vi.is_bound() {
            return Err(Error::Busy);
        }
        let pd = pd.by_owner(vi.owner_id).ok_or(Error::NotFound)?;

        let sock = XdpSocket::create()?;

        let page = OffsetsPage::alloc()?;
        page_map.add_page(page.addr());
        vi.user_offsets_page = Some(page);

        vi.umem_map = Some(sock.register_umem(&pd.umem, chunk_size, headroom)?);

        // the stack reads the rings through offsets relative to this record
        let kern_mem_base = std::ptr::from_ref(&vi.kernel_offsets) as u64;
        let mut user = XdpOffsets::default();
        vi.ring_maps = build_rings(
            &sock,
            page_map,
            kern_mem_base,
            vi.rxq_capacity,
            vi.txq_capacity,
            &mut vi.kernel_offsets.rings,
            &mut user.rings,
        )?;

        redirect.set_slot(instance as u32, sock.as_raw_fd())?;
        sock.bind_queue(if_index, instance as u32, vi.flags)?;

        user.mmap_bytes = page_map.total_bytes() as u64;
        if let Some(page) = vi.user_offsets_page.as_mut() {
            page.publish(&user);
        }

        let raw = sock.as_raw_fd();
        vi.sock = Some(sock);
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::OwnedFd;

    fn dummy_fd() -> OwnedFd {
        OwnedFd::from(File::open("/dev/null").unwrap())
    }

    /// A device with armed state but inert descriptors, enough to exercise
    /// every path that precedes a real socket or BPF syscall.
    fn test_nic(vi_lim: usize) -> AfXdpNic {
        AfXdpNic {
            if_index: 0,
            vi_lim,
            mac_addr: [0; 6],
            caps: NicCaps::default(),
            xdp: Some(AfXdpState {
                redirect: RedirectMap {
                    if_index: 0,
                    map: dummy_fd(),
                    prog: dummy_fd(),
                },
                vi: (0..vi_lim).map(|_| Vi::default()).collect(),
                pd: PdTable::new(),
            }),
        }
    }

    fn bind_marker(vi: &mut Vi) {
        vi.sock = Some(XdpSocket { fd: dummy_fd() });
    }

    #[test]
    fn queue_init_records_configuration() {
        let mut nic = test_nic(4);
        nic.dmaq_tx_q_init(1, 7, 256).unwrap();
        nic.dmaq_rx_q_init(1, 7, 512, VI_RX_ZEROCOPY).unwrap();

        let vi = &nic.xdp.as_ref().unwrap().vi[1];
        assert_eq!(vi.owner_id, 7);
        assert_eq!(vi.txq_capacity, 256);
        assert_eq!(vi.rxq_capacity, 512);
        assert_eq!(vi.flags & libc::XDP_ZEROCOPY, libc::XDP_ZEROCOPY);

        assert!(matches!(
            nic.dmaq_tx_q_init(4, 0, 16),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn rx_queue_without_zerocopy_requests_copy_mode() {
        let mut nic = test_nic(1);
        nic.dmaq_rx_q_init(0, 0, 128, 0).unwrap();
        let vi = &nic.xdp.as_ref().unwrap().vi[0];
        assert_eq!(vi.flags & libc::XDP_COPY, libc::XDP_COPY);
    }

    #[test]
    fn vi_init_validates_before_touching_anything() {
        let mut nic = test_nic(2);
        let mut page_map = PageMap::new();

        // 4096 % 3000 != 0
        assert!(matches!(
            nic.vi_init(0, 3000, 0, &mut page_map),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            nic.vi_init(7, 2048, 0, &mut page_map),
            Err(Error::NotFound)
        ));
        assert_eq!(page_map.pages(), 0);
    }

    #[test]
    fn vi_init_on_unarmed_device_is_not_found() {
        let mut nic = AfXdpNic::new(0, 4);
        let mut page_map = PageMap::new();
        assert!(matches!(
            nic.vi_init(0, 2048, 0, &mut page_map),
            Err(Error::Busy | Error::NotFound)
        ));
    }

    #[test]
    fn rebinding_a_bound_vi_is_busy_and_leaves_it_alone() {
        let mut nic = test_nic(2);
        nic.dmaq_rx_q_init(0, 3, 512, 0).unwrap();
        bind_marker(&mut nic.xdp.as_mut().unwrap().vi[0]);

        let mut page_map = PageMap::new();
        assert!(matches!(
            nic.vi_init(0, 2048, 0, &mut page_map),
            Err(Error::Busy)
        ));

        let vi = &nic.xdp.as_ref().unwrap().vi[0];
        assert!(vi.is_bound());
        assert_eq!(vi.owner_id, 3);
        assert_eq!(vi.rxq_capacity, 512);
        assert_eq!(page_map.pages(), 0);
    }

    #[test]
    fn disable_releases_and_is_idempotent() {
        let mut nic = test_nic(2);
        nic.dmaq_tx_q_init(1, 9, 64).unwrap();
        bind_marker(&mut nic.xdp.as_mut().unwrap().vi[1]);

        nic.event_queue_disable(1);
        let vi = &nic.xdp.as_ref().unwrap().vi[1];
        assert!(!vi.is_bound());
        assert_eq!(vi.owner_id, 0);

        nic.event_queue_disable(1);
        nic.event_queue_disable(99); // unknown instance is a no-op
    }

    #[test]
    fn buffer_table_contract_routes_to_the_domain_table() {
        let mut nic = test_nic(1);
        assert_eq!(nic.buffer_table_orders(), BUFFER_TABLE_ORDERS);

        let block = nic.buffer_table_alloc(5, 0).unwrap();
        nic.buffer_table_set(&block, 0, &[0x1000]).unwrap();
        nic.buffer_table_clear(&block, 0, 1);
        nic.buffer_table_free(block).unwrap();

        assert!(matches!(
            nic.buffer_table_realloc(5, 0, &block),
            Err(Error::Unsupported)
        ));

        let mut unarmed = AfXdpNic::new(0, 1);
        assert!(matches!(
            unarmed.buffer_table_alloc(0, 0),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn unsupported_surface_fails_cleanly() {
        let mut nic = test_nic(1);
        assert!(matches!(nic.handle_event(), Err(Error::Unsupported)));
        assert!(matches!(nic.flush_tx_dma_channel(0), Err(Error::Unsupported)));
        assert!(matches!(nic.flush_rx_dma_channel(0), Err(Error::Unsupported)));
        assert!(matches!(
            nic.set_port_sniff(0, true, false, 0),
            Err(Error::Unsupported)
        ));
        assert!(matches!(
            nic.set_tx_port_sniff(0, true, 0),
            Err(Error::Unsupported)
        ));
        assert!(matches!(nic.get_rx_error_stats(0), Err(Error::Unsupported)));
        assert!(matches!(nic.tx_alt_alloc(0, 1, 1), Err(Error::Unsupported)));
        assert!(matches!(nic.tx_alt_free(1, 0), Err(Error::Unsupported)));

        // stubs, not errors
        assert_eq!(nic.event_queue_enable(0, 1024).unwrap(), 0);
        assert!(!nic.license_check(1).unwrap());
        assert!(!nic.v3_license_check(1).unwrap());
        nic.license_challenge(1, &[0; 8]).unwrap();
        nic.v3_license_challenge(1, &[0; 8]).unwrap();
    }

    #[test]
    fn tweak_hardware_reports_zerocopy_only() {
        let mut nic = test_nic(1);
        nic.tweak_hardware();
        assert_eq!(nic.caps().flags, NIC_FLAG_RX_ZEROCOPY);
        assert_eq!(nic.caps().pio_num, 0);
        assert_eq!(nic.caps().rx_prefix_len, 0);
    }

    #[test]
    fn vi_mem_reflects_binding_state() {
        let mut nic = test_nic(2);
        assert_eq!(nic.vi_mem(0), Some(&XdpOffsets::default()));
        assert_eq!(nic.vi_mem(5), None);

        nic.event_queue_disable(0);
        assert_eq!(nic.vi_mem(0), Some(&XdpOffsets::default()));
    }
}
