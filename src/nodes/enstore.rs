use std::cmp::min;

use crate::types::DataPacket;

/// The buffered store between the detector, the grid and tape.
///
/// Raw and reco data share one pool. Receiving never fails: the pool can be pushed past
/// its capacity, and it is the reco offload to tape that brings it back down. Callers
/// learn about the overflow through [`is_full`](BufferStore::is_full).
#[derive(Debug, Clone)]
pub struct BufferStore {
    raw_events: u64,
    raw_size: f64,
    reco_events: u64,
    reco_size: f64,
    raw_event_size: f64,
    reco_event_size: f64,
    capacity: f64,
}

impl BufferStore {
    pub fn new(capacity: f64, raw_event_size: f64, reco_event_size: f64) -> Self {
        Self {
            raw_events: 0,
            raw_size: 0.0,
            reco_events: 0,
            reco_size: 0.0,
            raw_event_size,
            reco_event_size,
            capacity,
        }
    }

    pub fn receive_raw(&mut self, packet: DataPacket) {
        self.raw_events += packet.events();
        self.raw_size += packet.total_size();
    }

    pub fn receive_reco(&mut self, packet: DataPacket) {
        self.reco_events += packet.events();
        self.reco_size += packet.total_size();
    }

    /// Release up to `max_events` reco events for tape, but only once the pool has
    /// reached capacity. Below that, reco stays here and the tape link is left for
    /// staging raw backlog.
    pub fn offload_reco_to_tape(&mut self, max_events: u64) -> DataPacket {
        if self.occupancy() < self.capacity {
            return DataPacket::empty(self.reco_event_size);
        }
        let out = min(max_events, self.reco_events);
        let packet = DataPacket::new(out, self.reco_event_size);
        self.reco_events -= out;
        self.reco_size = (self.reco_size - packet.total_size()).max(0.0);
        packet
    }

    /// Release up to `n_events` raw events for processing, regardless of fill level
    pub fn send_raw_to_grid(&mut self, n_events: u64) -> DataPacket {
        let out = min(n_events, self.raw_events);
        let packet = DataPacket::new(out, self.raw_event_size);
        self.raw_events -= out;
        self.raw_size = (self.raw_size - packet.total_size()).max(0.0);
        packet
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() > self.capacity
    }

    /// Raw plus reco size currently held, in MB
    pub fn occupancy(&self) -> f64 {
        self.raw_size + self.reco_size
    }

    /// Occupancy as a fraction of capacity; above 1.0 while overfull
    pub fn fill_fraction(&self) -> f64 {
        self.occupancy() / self.capacity
    }

    pub fn raw_events(&self) -> u64 {
        self.raw_events
    }

    pub fn raw_size(&self) -> f64 {
        self.raw_size
    }

    pub fn reco_events(&self) -> u64 {
        self.reco_events
    }

    pub fn reco_size(&self) -> f64 {
        self.reco_size
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store() -> BufferStore {
        BufferStore::new(1000.0, 10.0, 10.0)
    }

    #[test]
    fn no_offload_below_capacity() {
        let mut enstore = store();
        enstore.receive_reco(DataPacket::new(50, 10.0));
        let p = enstore.offload_reco_to_tape(100);
        assert!(p.is_empty());
        assert_eq!(enstore.reco_events(), 50);
    }

    #[test]
    fn offload_when_over_capacity() {
        let mut enstore = store();
        enstore.receive_raw(DataPacket::new(40, 10.0));
        enstore.receive_reco(DataPacket::new(80, 10.0));
        assert_relative_eq!(enstore.occupancy(), 1200.0);
        assert!(enstore.is_full());

        let p = enstore.offload_reco_to_tape(30);
        assert_eq!(p, DataPacket::new(30, 10.0));
        assert_eq!(enstore.reco_events(), 50);
        assert_relative_eq!(enstore.reco_size(), 500.0);
        assert_eq!(enstore.raw_events(), 40);
    }

    #[test]
    fn offload_at_exact_capacity() {
        let mut enstore = store();
        enstore.receive_reco(DataPacket::new(100, 10.0));
        // at capacity is not full, but offload already kicks in
        assert!(!enstore.is_full());
        let p = enstore.offload_reco_to_tape(500);
        assert_eq!(p.events(), 100);
        assert_eq!(enstore.reco_events(), 0);
        assert_eq!(enstore.reco_size(), 0.0);
    }

    #[test]
    fn receiving_is_never_refused() {
        let mut enstore = store();
        enstore.receive_raw(DataPacket::new(500, 10.0));
        assert_eq!(enstore.raw_events(), 500);
        assert_relative_eq!(enstore.fill_fraction(), 5.0);
    }

    #[test]
    fn raw_drains_regardless_of_fill() {
        let mut enstore = store();
        enstore.receive_raw(DataPacket::new(150, 10.0));
        let p = enstore.send_raw_to_grid(20);
        assert_eq!(p, DataPacket::new(20, 10.0));
        let p = enstore.send_raw_to_grid(1000);
        assert_eq!(p.events(), 130);
        assert_eq!(enstore.raw_events(), 0);
        assert_eq!(enstore.raw_size(), 0.0);
    }

    #[test]
    fn zero_requests_change_nothing() {
        let mut enstore = store();
        enstore.receive_raw(DataPacket::new(70, 10.0));
        enstore.receive_reco(DataPacket::new(70, 10.0));
        let before = (enstore.raw_events(), enstore.reco_events(), enstore.occupancy());

        assert!(enstore.offload_reco_to_tape(0).is_empty());
        assert!(enstore.send_raw_to_grid(0).is_empty());
        assert_eq!(
            (enstore.raw_events(), enstore.reco_events(), enstore.occupancy()),
            before
        );
    }
}
