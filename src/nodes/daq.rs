use crate::randvars::CountSource;
use crate::types::{DataPacket, Duration};

/// Detector front-end, emitting raw events at a configured trigger rate
#[derive(Debug, Clone)]
pub struct IngestSource {
    rate_hz: f64,
    event_size: f64,
}

impl IngestSource {
    pub fn new(rate_hz: f64, event_size: f64) -> Self {
        Self { rate_hz, event_size }
    }

    /// Raw events triggered during `tick`, with the count drawn from `counts`
    pub fn generate(&self, tick: Duration, counts: &mut impl CountSource) -> DataPacket {
        let expected = self.rate_hz * *tick;
        DataPacket::new(counts.draw(expected), self.event_size)
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randvars::{CountSource, Scripted};

    /// records the mean it was asked for
    struct Spy(Vec<f64>);

    impl CountSource for Spy {
        fn draw(&mut self, mean: f64) -> u64 {
            self.0.push(mean);
            2
        }
    }

    #[test]
    fn expected_count_scales_with_tick() {
        let daq = IngestSource::new(0.5, 40.0);
        assert_eq!(daq.rate_hz(), 0.5);
        let mut spy = Spy(vec![]);
        daq.generate(Duration(10.0), &mut spy);
        daq.generate(Duration(3.0), &mut spy);
        assert_eq!(spy.0, vec![5.0, 1.5]);
    }

    #[test]
    fn packet_uses_drawn_count_and_event_size() {
        let daq = IngestSource::new(0.5, 40.0);
        let mut counts = Scripted::new(vec![7, 0]);
        let p = daq.generate(Duration(10.0), &mut counts);
        assert_eq!(p, DataPacket::new(7, 40.0));
        let p = daq.generate(Duration(10.0), &mut counts);
        assert!(p.is_empty());
    }
}
