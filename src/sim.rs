//! The step driver.
//!
//! One tick is a fixed pipeline of stages. Each stage consumes the value produced by the
//! one before it, so the order below is enforced by the types rather than by the order of
//! statements in a loop body:
//!
//! ```text
//! produce   DAQ triggers raw events, grid finishes reco events
//! receive   enstore takes in both packets
//! offload   enstore pushes reco to tape, only once it is at capacity
//! recall    leftover tape bandwidth stages raw backlog into enstore
//! archive   tape records the reco it received
//! dispatch  enstore hands raw events to free grid workers
//! ```
//!
//! `receive` must come before `offload` because the offload gate looks at the fill level,
//! and `offload` before `recall` because both share the same tape budget.

use itertools::Itertools;
use parse_display::Display;

use crate::nodes::{ArchiveBacklog, BufferStore, IngestSource, ProcessingFarm};
use crate::randvars::CountSource;
use crate::types::{DataPacket, Duration, Time};
use crate::utils::prelude::*;

mod config;
mod snapshot;

pub use self::config::{DaqConfig, EnstoreConfig, GridConfig, LeftoverSizing, PipelineConfig, RunConfig, TapeConfig};
pub use self::snapshot::{EnstoreLevels, GridLevels, Snapshot, TapeLevels, TickReport};

/// Named stages of a tick, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "snake_case")]
pub enum Stage {
    Produce,
    Receive,
    Offload,
    Recall,
    Archive,
    Dispatch,
}

pub const STAGES: [Stage; 6] = [
    Stage::Produce,
    Stage::Receive,
    Stage::Offload,
    Stage::Recall,
    Stage::Archive,
    Stage::Dispatch,
];

/// Packets created by the sources at the start of a tick
#[derive(Debug, Clone, Copy)]
struct Produced {
    daq: DataPacket,
    grid: DataPacket,
}

/// Packets already absorbed by enstore
#[derive(Debug, Clone, Copy)]
struct Received(Produced);

#[derive(Debug, Clone, Copy)]
struct Offloaded {
    received: Received,
    budget_mb: f64,
    reco_to_tape: DataPacket,
}

#[derive(Debug, Clone, Copy)]
struct Recalled {
    offloaded: Offloaded,
    raw_from_tape: DataPacket,
}

/// Reco offload already recorded on tape
#[derive(Debug, Clone, Copy)]
struct Archived(Recalled);

#[derive(Debug, Clone, Copy)]
struct Dispatched {
    archived: Archived,
    grid_available: u64,
    raw_to_grid: DataPacket,
}

/// Called after every tick with a read-only view of the pipeline
pub trait TickObserver {
    fn on_tick(&mut self, snapshot: &Snapshot, tick: &TickReport) -> Result<()>;
}

impl<F> TickObserver for F
where
    F: FnMut(&Snapshot, &TickReport) -> Result<()>,
{
    fn on_tick(&mut self, snapshot: &Snapshot, tick: &TickReport) -> Result<()> {
        self(snapshot, tick)
    }
}

/// Owns the four nodes and the clock, and moves packets between them
pub struct Simulation<C = Box<dyn CountSource>> {
    cfg: PipelineConfig,
    time: Time,
    ticks: u64,
    counts: C,

    daq: IngestSource,
    grid: ProcessingFarm,
    tape: ArchiveBacklog,
    enstore: BufferStore,

    was_full: bool,
}

impl<C: CountSource> Simulation<C> {
    pub fn new(cfg: PipelineConfig, counts: C) -> Result<Self> {
        cfg.validate()?;
        info!(stages = %STAGES.iter().join(" -> "), leftover_sizing = %cfg.tape.leftover_sizing, "pipeline");

        let daq = IngestSource::new(cfg.daq.rate_hz, cfg.raw_event_size_mb);
        let grid = ProcessingFarm::new(cfg.grid.workers, cfg.grid.rate_per_worker_hz, cfg.reco_event_size_mb);
        let tape = ArchiveBacklog::new(cfg.tape.backlog_events, cfg.raw_event_size_mb);
        let enstore = BufferStore::new(cfg.enstore.capacity_mb, cfg.raw_event_size_mb, cfg.reco_event_size_mb);

        Ok(Self {
            cfg,
            time: Time::default(),
            ticks: 0,
            counts,
            daq,
            grid,
            tape,
            enstore,
            was_full: false,
        })
    }

    /// Advance the clock by one tick and run every stage
    pub fn step(&mut self) -> TickReport {
        let tick = self.cfg.tick();
        self.time += tick;
        self.ticks += 1;
        let _s = trace_span!("tick", n = self.ticks, time = %self.time).entered();

        let produced = self.produce(tick);
        let received = self.receive(produced);
        let offloaded = self.offload(received);
        let recalled = self.recall(offloaded);
        let archived = self.archive(recalled);
        let dispatched = self.dispatch(archived);

        self.note_fullness();
        self.report(dispatched)
    }

    fn produce(&mut self, tick: Duration) -> Produced {
        let daq = self.daq.generate(tick, &mut self.counts);
        let grid = self.grid.process(tick);
        trace!(stage = %Stage::Produce, %daq, %grid);
        Produced { daq, grid }
    }

    fn receive(&mut self, produced: Produced) -> Received {
        self.enstore.receive_raw(produced.daq);
        self.enstore.receive_reco(produced.grid);
        trace!(stage = %Stage::Receive, occupancy = self.enstore.occupancy());
        Received(produced)
    }

    fn offload(&mut self, received: Received) -> Offloaded {
        let budget_mb = self.cfg.tape_budget_mb();
        let max_reco = (budget_mb / self.cfg.reco_event_size_mb).floor() as u64;
        let reco_to_tape = self.enstore.offload_reco_to_tape(max_reco);
        trace!(stage = %Stage::Offload, max_reco, %reco_to_tape);
        Offloaded {
            received,
            budget_mb,
            reco_to_tape,
        }
    }

    fn recall(&mut self, offloaded: Offloaded) -> Recalled {
        let leftover = offloaded.budget_mb - offloaded.reco_to_tape.total_size();
        let event_size = match self.cfg.tape.leftover_sizing {
            LeftoverSizing::Reco => self.cfg.reco_event_size_mb,
            LeftoverSizing::Raw => self.cfg.raw_event_size_mb,
        };
        let max_raw = if leftover < 0.0 || self.enstore.is_full() {
            0
        } else {
            (leftover / event_size).floor() as u64
        };
        let raw_from_tape = self.tape.release_backlog(max_raw);
        self.enstore.receive_raw(raw_from_tape);
        trace!(stage = %Stage::Recall, leftover, max_raw, %raw_from_tape);
        Recalled {
            offloaded,
            raw_from_tape,
        }
    }

    fn archive(&mut self, recalled: Recalled) -> Archived {
        let reco = recalled.offloaded.reco_to_tape;
        if !reco.is_empty() {
            self.tape.absorb_reco(reco);
        }
        trace!(stage = %Stage::Archive, processed = self.tape.processed());
        Archived(recalled)
    }

    fn dispatch(&mut self, archived: Archived) -> Dispatched {
        let grid_available = self.grid.available_capacity();
        let raw_to_grid = if grid_available > 0 {
            let packet = self.enstore.send_raw_to_grid(grid_available);
            self.grid.enqueue(packet);
            packet
        } else {
            DataPacket::empty(self.cfg.raw_event_size_mb)
        };
        trace!(stage = %Stage::Dispatch, grid_available, %raw_to_grid);
        Dispatched {
            archived,
            grid_available,
            raw_to_grid,
        }
    }

    fn note_fullness(&mut self) {
        let full = self.enstore.is_full();
        if full != self.was_full {
            let fill = self.enstore.fill_fraction();
            if full {
                warn!(time.days = self.time.days(), fill, "enstore went over capacity");
            } else {
                info!(time.days = self.time.days(), fill, "enstore back under capacity");
            }
            self.was_full = full;
        }
    }

    fn report(&self, dispatched: Dispatched) -> TickReport {
        let Dispatched {
            archived: Archived(recalled),
            grid_available,
            raw_to_grid,
        } = dispatched;
        let Received(produced) = recalled.offloaded.received;
        TickReport {
            tick: self.ticks,
            time: self.time,
            daq: produced.daq,
            grid_out: produced.grid,
            reco_to_tape: recalled.offloaded.reco_to_tape,
            raw_from_tape: recalled.raw_from_tape,
            grid_available,
            raw_to_grid,
            tape_budget_mb: recalled.offloaded.budget_mb,
        }
    }

    /// Whether the run is over: simulated time is past the horizon, or the tick limit is hit
    pub fn is_end(&self, until: &RunConfig) -> bool {
        self.time.days() > until.horizon_days || until.max_ticks.map(|m| self.ticks >= m).unwrap_or(false)
    }

    /// Step until `until` says stop, handing every tick to `observer`
    pub fn run(&mut self, until: &RunConfig, observer: &mut impl TickObserver) -> Result<()> {
        until.validate()?;
        let _g = info_span!("run", horizon_days = until.horizon_days).entered();
        while !self.is_end(until) {
            let report = self.step();
            observer.on_tick(&self.snapshot(), &report)?;
        }
        info!(ticks = self.ticks, days = self.time.days(), "run finished");
        Ok(())
    }
}

impl<C> Simulation<C> {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.time,
            ticks: self.ticks,
            enstore: EnstoreLevels {
                raw_events: self.enstore.raw_events(),
                raw_mb: self.enstore.raw_size(),
                reco_events: self.enstore.reco_events(),
                reco_mb: self.enstore.reco_size(),
                capacity_mb: self.enstore.capacity(),
                fill: self.enstore.fill_fraction(),
                full: self.enstore.is_full(),
            },
            tape: TapeLevels {
                backlog_events: self.tape.backlog(),
                processed_events: self.tape.processed(),
            },
            grid: GridLevels {
                queued_events: self.grid.queued(),
                available: self.grid.available_capacity(),
                nominal_throughput: self.grid.nominal_throughput(self.cfg.tick()),
            },
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn daq(&self) -> &IngestSource {
        &self.daq
    }

    pub fn grid(&self) -> &ProcessingFarm {
        &self.grid
    }

    pub fn tape(&self) -> &ArchiveBacklog {
        &self.tape
    }

    pub fn enstore(&self) -> &BufferStore {
        &self.enstore
    }
}
