use std::cmp::min;

use crate::types::{DataPacket, Duration};

/// Compute grid turning queued raw events into reco events.
///
/// Two deliberate approximations live here, kept separate so a per-job dispatch model
/// can replace them without touching the callers:
/// - throughput is the steady rate `workers * rate_per_worker`, with no per-job noise;
/// - free worker slots are estimated from the queue depth, see [`available_capacity`].
///
/// [`available_capacity`]: ProcessingFarm::available_capacity
#[derive(Debug, Clone)]
pub struct ProcessingFarm {
    queued: u64,
    workers: u64,
    rate_per_worker_hz: f64,
    output_event_size: f64,
}

impl ProcessingFarm {
    pub fn new(workers: u64, rate_per_worker_hz: f64, output_event_size: f64) -> Self {
        Self {
            queued: 0,
            workers,
            rate_per_worker_hz,
            output_event_size,
        }
    }

    /// Expected events finished in one tick at steady rate, not rounded
    pub fn nominal_throughput(&self, tick: Duration) -> f64 {
        *tick * self.rate_per_worker_hz * self.workers as f64
    }

    /// Whole events the farm finishes in one tick
    pub fn throughput(&self, tick: Duration) -> u64 {
        self.nominal_throughput(tick).floor() as u64
    }

    /// Finish up to one tick worth of queued events and hand them out as reco
    pub fn process(&mut self, tick: Duration) -> DataPacket {
        if self.queued == 0 {
            return DataPacket::empty(self.output_event_size);
        }
        let done = min(self.queued, self.throughput(tick));
        self.queued -= done;
        DataPacket::new(done, self.output_event_size)
    }

    /// The farm never refuses work
    pub fn enqueue(&mut self, packet: DataPacket) {
        self.queued += packet.events();
    }

    /// Coarse estimate of idle workers: `workers - queued`, floored at zero.
    ///
    /// This treats every queued event as an occupied slot rather than tracking job
    /// launches and completions, so it is only a throughput hint.
    pub fn available_capacity(&self) -> u64 {
        self.workers.saturating_sub(self.queued)
    }

    pub fn queued(&self) -> u64 {
        self.queued
    }

    pub fn workers(&self) -> u64 {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm() -> ProcessingFarm {
        ProcessingFarm::new(100, 0.05, 120.0)
    }

    #[test]
    fn idle_farm_produces_nothing() {
        let mut grid = farm();
        let p = grid.process(Duration(10.0));
        assert!(p.is_empty());
        assert_eq!(grid.queued(), 0);
    }

    #[test]
    fn queue_depth_hides_free_workers() {
        let mut grid = farm();
        assert!(grid.process(Duration(10.0)).is_empty());
        grid.enqueue(DataPacket::new(150, 40.0));
        assert_eq!(grid.available_capacity(), 0);
        grid.enqueue(DataPacket::empty(40.0));
        assert_eq!(grid.queued(), 150);
    }

    #[test]
    fn throughput_is_floored() {
        // 10 * 1/800 * 1000 = 12.5
        let grid = ProcessingFarm::new(1000, 1.0 / 800.0, 120.0);
        assert_eq!(grid.workers(), 1000);
        assert!((grid.nominal_throughput(Duration(10.0)) - 12.5).abs() < 1e-9);
        assert_eq!(grid.throughput(Duration(10.0)), 12);
    }

    #[test]
    fn dispatch_is_bounded_by_throughput_then_drains() {
        let mut grid = farm();
        grid.enqueue(DataPacket::new(60, 40.0));
        // 10s * 0.05 * 100 = 50 per tick
        let p = grid.process(Duration(10.0));
        assert_eq!(p, DataPacket::new(50, 120.0));
        assert_eq!(grid.queued(), 10);
        let p = grid.process(Duration(10.0));
        assert_eq!(p.events(), 10);
        assert_eq!(grid.queued(), 0);
        assert_eq!(grid.available_capacity(), 100);
    }

    #[test]
    fn queue_is_conserved() {
        let mut grid = farm();
        let mut expected = 0u64;
        for n in [0u64, 7, 130, 3, 0, 42] {
            grid.enqueue(DataPacket::new(n, 40.0));
            expected += n;
            let out = grid.process(Duration(10.0));
            expected -= out.events();
            assert_eq!(grid.queued(), expected);
        }
    }
}
