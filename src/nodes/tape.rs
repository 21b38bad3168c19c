use std::cmp::min;

use crate::types::DataPacket;

/// Tape archive: a shrinking backlog of raw events not yet staged, and a growing
/// count of reco events written back. Its capacity is unlimited.
#[derive(Debug, Clone)]
pub struct ArchiveBacklog {
    backlog: u64,
    processed: u64,
    raw_event_size: f64,
}

impl ArchiveBacklog {
    pub fn new(backlog: u64, raw_event_size: f64) -> Self {
        Self {
            backlog,
            processed: 0,
            raw_event_size,
        }
    }

    /// Stage up to `max_events` backlog events out of the archive
    pub fn release_backlog(&mut self, max_events: u64) -> DataPacket {
        let send = min(max_events, self.backlog);
        self.backlog -= send;
        DataPacket::new(send, self.raw_event_size)
    }

    pub fn absorb_reco(&mut self, packet: DataPacket) {
        self.processed += packet.events();
    }

    pub fn backlog(&self) -> u64 {
        self.backlog
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_stops_at_empty_backlog() {
        let mut tape = ArchiveBacklog::new(10, 40.0);
        let p = tape.release_backlog(100);
        assert_eq!(p, DataPacket::new(10, 40.0));
        assert_eq!(tape.backlog(), 0);
        assert!(tape.release_backlog(5).is_empty());
        assert!(tape.release_backlog(u64::MAX).is_empty());
        assert_eq!(tape.backlog(), 0);
    }

    #[test]
    fn zero_request_is_a_no_op() {
        let mut tape = ArchiveBacklog::new(10, 40.0);
        assert!(tape.release_backlog(0).is_empty());
        assert_eq!(tape.backlog(), 10);
    }

    #[test]
    fn reco_is_counted() {
        let mut tape = ArchiveBacklog::new(0, 40.0);
        tape.absorb_reco(DataPacket::new(30, 120.0));
        tape.absorb_reco(DataPacket::empty(120.0));
        tape.absorb_reco(DataPacket::new(7, 120.0));
        assert_eq!(tape.processed(), 37);
    }
}
