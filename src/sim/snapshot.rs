use serde::Serialize;

use crate::types::{DataPacket, Time};

/// Read-only copy of every public counter, taken between ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: Time,
    pub ticks: u64,
    pub enstore: EnstoreLevels,
    pub tape: TapeLevels,
    pub grid: GridLevels,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnstoreLevels {
    pub raw_events: u64,
    pub raw_mb: f64,
    pub reco_events: u64,
    pub reco_mb: f64,
    pub capacity_mb: f64,
    /// occupancy over capacity, may exceed 1.0
    pub fill: f64,
    pub full: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TapeLevels {
    pub backlog_events: u64,
    pub processed_events: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridLevels {
    pub queued_events: u64,
    pub available: u64,
    /// expected events finished per tick at full steady rate, fractional
    pub nominal_throughput: f64,
}

/// What moved during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub time: Time,
    /// raw events triggered by the detector
    pub daq: DataPacket,
    /// reco events finished by the grid
    pub grid_out: DataPacket,
    pub reco_to_tape: DataPacket,
    pub raw_from_tape: DataPacket,
    /// free grid slots seen when dispatching
    pub grid_available: u64,
    pub raw_to_grid: DataPacket,
    /// tape transfer budget for the tick, in MB
    pub tape_budget_mb: f64,
}

impl TickReport {
    /// Share of the tape budget spent on reco offload
    pub fn reco_bandwidth_share(&self) -> f64 {
        self.reco_to_tape.total_size() / self.tape_budget_mb
    }

    /// Share of the tape budget spent in either direction
    pub fn tape_utilization(&self) -> f64 {
        (self.reco_to_tape.total_size() + self.raw_from_tape.total_size()) / self.tape_budget_mb
    }
}
