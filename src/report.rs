//! Periodic status reports and the end-of-run summary.
//!
//! Everything here works from [`Snapshot`]s and [`TickReport`]s, so reporting can read the
//! pipeline but never change it.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use bytesize::ByteSize;
use serde::Serialize;

use crate::sim::{Snapshot, TickObserver, TickReport};
use crate::types::{Duration, Time};
use crate::utils::prelude::*;

fn mb(size_mb: f64) -> ByteSize {
    ByteSize::b((size_mb.max(0.0) * 1e6) as u64)
}

/// Human readable status at one point of the run
pub struct StatusReport<'a> {
    pub snapshot: &'a Snapshot,
    pub tick: &'a TickReport,
}

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        let t = self.tick;
        writeln!(f, "time= {:.2} days (tick {})", s.time.days(), s.ticks)?;
        writeln!(f, " [DAQ] sent= {}", t.daq.events())?;
        writeln!(
            f,
            " [GRID] finished= {} sent to enstore, nominal {} per tick",
            t.grid_out.events(),
            s.grid.nominal_throughput
        )?;
        writeln!(
            f,
            " [ENSTORE] raw= {} ({}) reco= {} ({}) fill= {:.2}%",
            mb(s.enstore.raw_mb),
            s.enstore.raw_events,
            mb(s.enstore.reco_mb),
            s.enstore.reco_events,
            100.0 * s.enstore.fill
        )?;
        writeln!(
            f,
            " [TAPE] event backlog= {} processed= {}",
            s.tape.backlog_events, s.tape.processed_events
        )?;
        writeln!(
            f,
            " [SEND] {} overflow reco from enstore to tape ({:.2}% of tape bandwidth)",
            t.reco_to_tape.events(),
            100.0 * t.reco_bandwidth_share()
        )?;
        writeln!(f, " [SEND] {} raw events from tape to enstore", t.raw_from_tape.events())?;
        writeln!(
            f,
            " [SEND] {} raw events from enstore to grid ({} slots free)",
            t.raw_to_grid.events(),
            t.grid_available
        )?;
        write!(
            f,
            " [GRID] workers available= {} events queued= {}",
            s.grid.available, s.grid.queued_events
        )?;
        if s.enstore.full {
            write!(f, "\n!! [ENSTORE FULL] !!")?;
        }
        Ok(())
    }
}

/// One line of the CSV trace
#[derive(Debug, Serialize)]
struct ReportRow {
    tick: u64,
    days: f64,
    daq_events: u64,
    grid_out_events: u64,
    raw_events: u64,
    raw_mb: f64,
    reco_events: u64,
    reco_mb: f64,
    fill: f64,
    full: bool,
    backlog_events: u64,
    tape_processed_events: u64,
    reco_to_tape_events: u64,
    raw_from_tape_events: u64,
    raw_to_grid_events: u64,
    grid_queued_events: u64,
    tape_utilization: f64,
}

impl ReportRow {
    fn new(s: &Snapshot, t: &TickReport) -> Self {
        Self {
            tick: s.ticks,
            days: s.time.days(),
            daq_events: t.daq.events(),
            grid_out_events: t.grid_out.events(),
            raw_events: s.enstore.raw_events,
            raw_mb: s.enstore.raw_mb,
            reco_events: s.enstore.reco_events,
            reco_mb: s.enstore.reco_mb,
            fill: s.enstore.fill,
            full: s.enstore.full,
            backlog_events: s.tape.backlog_events,
            tape_processed_events: s.tape.processed_events,
            reco_to_tape_events: t.reco_to_tape.events(),
            raw_from_tape_events: t.raw_from_tape.events(),
            raw_to_grid_events: t.raw_to_grid.events(),
            grid_queued_events: s.grid.queued_events,
            tape_utilization: t.tape_utilization(),
        }
    }
}

/// Event counts accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub daq_events: u64,
    pub reco_produced: u64,
    pub reco_to_tape: u64,
    pub raw_from_tape: u64,
    pub raw_to_grid: u64,
    pub full_ticks: u64,
}

impl Totals {
    fn add(&mut self, s: &Snapshot, t: &TickReport) {
        self.daq_events += t.daq.events();
        self.reco_produced += t.grid_out.events();
        self.reco_to_tape += t.reco_to_tape.events();
        self.raw_from_tape += t.raw_from_tape.events();
        self.raw_to_grid += t.raw_to_grid.events();
        if s.enstore.full {
            self.full_ticks += 1;
        }
    }
}

/// Distribution of the enstore fill fraction over all ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillStats {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

/// Running mean, variance and max of the fill fraction, in constant space
#[derive(Debug, Clone, Copy, Default)]
struct FillAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl FillAccumulator {
    fn push(&mut self, fill: f64) {
        self.count += 1;
        let delta = fill - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (fill - self.mean);
        self.max = if self.count == 1 { fill } else { self.max.max(fill) };
    }

    /// Sample standard deviation, 0 for a single tick
    fn stats(&self) -> Option<FillStats> {
        if self.count == 0 {
            return None;
        }
        let std_dev = if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        };
        Some(FillStats {
            mean: self.mean,
            std_dev,
            max: self.max,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub days: f64,
    pub reports: usize,
    pub totals: Totals,
    pub fill: Option<FillStats>,
    pub last: Option<Snapshot>,
}

/// Watches every tick: prints a status report every `interval`, optionally traces rows
/// into a CSV file, and keeps totals for the summary.
pub struct Reporter<W> {
    interval: Duration,
    last_report: Time,
    out: W,
    trace: Option<csv::Writer<File>>,
    totals: Totals,
    fill: FillAccumulator,
    reports: usize,
    last: Option<Snapshot>,
}

impl<W: io::Write> Reporter<W> {
    pub fn new(interval_days: f64, out: W) -> Self {
        Self {
            interval: Duration::from_days(interval_days),
            last_report: Time::default(),
            out,
            trace: None,
            totals: Default::default(),
            fill: Default::default(),
            reports: 0,
            last: None,
        }
    }

    /// Also write a CSV row at every report
    pub fn with_trace(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "writing report trace");
        self.trace = Some(csv::Writer::from_path(path)?);
        Ok(self)
    }

    /// Strictly more than one interval since the previous report
    fn due(&self, now: Time) -> bool {
        now - self.last_report > self.interval
    }

    fn emit(&mut self, s: &Snapshot, t: &TickReport) -> Result<()> {
        info!(
            days = s.time.days(),
            fill = s.enstore.fill,
            backlog = s.tape.backlog_events,
            processed = s.tape.processed_events,
            "status"
        );
        writeln!(self.out, "{}", StatusReport { snapshot: s, tick: t })?;
        if let Some(trace) = self.trace.as_mut() {
            trace.serialize(ReportRow::new(s, t))?;
        }
        self.reports += 1;
        self.last_report = s.time;
        Ok(())
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn finish(mut self) -> Result<RunSummary> {
        if let Some(mut trace) = self.trace.take() {
            trace.flush()?;
        }
        self.out.flush()?;

        let (ticks, days) = self.last.map(|s| (s.ticks, s.time.days())).unwrap_or((0, 0.0));

        Ok(RunSummary {
            ticks,
            days,
            reports: self.reports,
            totals: self.totals,
            fill: self.fill.stats(),
            last: self.last,
        })
    }
}

impl<W: io::Write> TickObserver for Reporter<W> {
    fn on_tick(&mut self, snapshot: &Snapshot, tick: &TickReport) -> Result<()> {
        self.totals.add(snapshot, tick);
        self.fill.push(snapshot.enstore.fill);
        self.last = Some(*snapshot);
        if self.due(snapshot.time) {
            self.emit(snapshot, tick)?;
        }
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "finished {} ticks ({:.2} days)", self.ticks, self.days)?;
        writeln!(
            f,
            " [DAQ] {} events, [GRID] {} reco produced, {} raw dispatched",
            self.totals.daq_events, self.totals.reco_produced, self.totals.raw_to_grid
        )?;
        write!(
            f,
            " [TAPE] {} reco archived, {} raw staged from backlog",
            self.totals.reco_to_tape, self.totals.raw_from_tape
        )?;
        if let Some(fill) = &self.fill {
            write!(
                f,
                "\n [ENSTORE] fill mean= {:.2}% sd= {:.2}% max= {:.2}%, over capacity for {} ticks",
                100.0 * fill.mean,
                100.0 * fill.std_dev,
                100.0 * fill.max,
                self.totals.full_ticks
            )?;
        }
        Ok(())
    }
}

/// Write the summary and the config that produced it as one JSON document
pub fn render_summary(path: impl AsRef<Path>, summary: &RunSummary, config: &impl Serialize) -> Result<()> {
    #[derive(Serialize)]
    struct Document<'a, C> {
        summary: &'a RunSummary,
        config: &'a C,
    }

    let path = path.as_ref();
    info!(path = %path.display(), "writing summary");
    let file = io::BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &Document { summary, config })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randvars::Scripted;
    use crate::sim::{PipelineConfig, RunConfig, Simulation};
    use approx::assert_relative_eq;

    /// a 200 MB pool in front of a single worker finishing one event per tick
    fn small_pool() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.enstore.capacity_mb = 200.0;
        cfg.grid.workers = 1;
        cfg.grid.rate_per_worker_hz = 0.1;
        cfg
    }

    fn run_days(days: f64, interval: f64) -> (Simulation<Scripted>, RunSummary, String) {
        let mut sim = Simulation::new(small_pool(), Scripted::default().then(5)).unwrap();
        let until = RunConfig {
            horizon_days: days,
            report_interval_days: interval,
            max_ticks: None,
        };
        let mut reporter = Reporter::new(interval, Vec::new());
        sim.run(&until, &mut reporter).unwrap();
        let out = String::from_utf8(reporter.out.clone()).unwrap();
        let summary = reporter.finish().unwrap();
        (sim, summary, out)
    }

    #[test]
    fn reports_at_interval() {
        // 0.25 days of 10s ticks, reporting every 0.05 days
        let (sim, summary, out) = run_days(0.25, 0.05);
        assert_eq!(summary.ticks, sim.ticks());
        assert_eq!(out.matches("[DAQ]").count(), summary.reports);
        // strictly-greater-than comparison: 0.25 / 0.05 = 5 intervals, minus edge effects
        assert!(summary.reports >= 4 && summary.reports <= 5, "{}", summary.reports);
    }

    #[test]
    fn totals_match_the_pipeline() {
        let (sim, summary, _) = run_days(0.1, 1.0);
        let t = &summary.totals;
        assert_eq!(t.daq_events, 5 * sim.ticks());
        assert_eq!(t.reco_to_tape, sim.tape().processed());
        assert_eq!(t.raw_from_tape, PipelineConfig::default().tape.backlog_events - sim.tape().backlog());
        assert_eq!(summary.last.unwrap().enstore.reco_events, sim.enstore().reco_events());
        let fill = summary.fill.unwrap();
        assert!(fill.max >= fill.mean);
        assert!(t.full_ticks > 0);
    }

    #[test]
    fn status_report_flags_full_enstore() {
        let mut sim = Simulation::new(small_pool(), Scripted::new(vec![10])).unwrap();
        let tick = sim.step();
        let snapshot = sim.snapshot();
        assert!(snapshot.enstore.full);
        let text = StatusReport {
            snapshot: &snapshot,
            tick: &tick,
        }
        .to_string();
        assert!(text.contains(" [DAQ] sent= 10"));
        // 10s * 0.1 Hz * 1 worker
        assert!(text.contains("nominal 1 per tick"), "{}", text);
        assert!(text.contains("[TAPE] event backlog="));
        assert!(text.ends_with("!! [ENSTORE FULL] !!"));
    }

    #[test]
    fn quiet_daq_keeps_pool_nearly_empty() {
        let mut sim = Simulation::new(PipelineConfig::default(), Scripted::default()).unwrap();
        let mut reporter = Reporter::new(1.0, io::sink());
        let until = RunConfig {
            max_ticks: Some(10),
            ..RunConfig::default()
        };
        sim.run(&until, &mut reporter).unwrap();
        let totals = *reporter.totals();
        let summary = reporter.finish().unwrap();
        assert_eq!(summary.totals, totals);
        assert_eq!(summary.ticks, 10);
        assert_eq!(summary.reports, 0);
        assert_eq!(summary.totals.daq_events, 0);
        // only staged backlog flows: raw goes straight to the grid, 12 reco come back per tick
        let fill = summary.fill.unwrap();
        assert!(fill.max > 0.0 && fill.max < 1e-3, "{}", fill.max);
        assert_relative_eq!(fill.max, summary.last.unwrap().enstore.fill);
    }

    #[test]
    fn grid_line_shows_unrounded_throughput() {
        let mut sim = Simulation::new(PipelineConfig::default(), Scripted::default()).unwrap();
        let tick = sim.step();
        let snapshot = sim.snapshot();
        let text = StatusReport {
            snapshot: &snapshot,
            tick: &tick,
        }
        .to_string();
        // 10s * 1/800 Hz * 1000 workers
        assert!(text.contains("nominal 12.5 per tick"), "{}", text);
    }

    #[test]
    fn fill_stats_agree_with_batch_statistics() {
        use statrs::statistics::Statistics;

        let fills = [0.1, 0.4, 0.35, 1.2, 0.9, 0.0, 0.75];
        let mut acc = FillAccumulator::default();
        assert!(acc.stats().is_none());
        for f in fills.iter() {
            acc.push(*f);
        }
        let stats = acc.stats().unwrap();
        assert_relative_eq!(stats.mean, fills.iter().mean(), epsilon = 1e-12);
        assert_relative_eq!(stats.std_dev, fills.iter().std_dev(), epsilon = 1e-12);
        assert_relative_eq!(stats.max, Statistics::max(fills.iter()));
    }

    #[test]
    fn single_tick_has_no_spread() {
        let mut acc = FillAccumulator::default();
        acc.push(0.3);
        let stats = acc.stats().unwrap();
        assert_relative_eq!(stats.std_dev, 0.0);
        assert_relative_eq!(stats.max, 0.3);
        assert_relative_eq!(stats.mean, 0.3);
    }

    #[test]
    fn summary_document_is_json() {
        let (_, summary, _) = run_days(0.01, 1.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        render_summary(&path, &summary, &PipelineConfig::default()).unwrap();
        let doc: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(doc["summary"]["ticks"], summary.ticks);
        assert_eq!(doc["config"]["tick_secs"], 10.0);
    }

    #[test]
    fn trace_has_a_row_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut sim = Simulation::new(small_pool(), Scripted::default().then(1)).unwrap();
        let until = RunConfig {
            horizon_days: 0.2,
            report_interval_days: 0.05,
            max_ticks: None,
        };
        let mut reporter = Reporter::new(0.05, io::sink()).with_trace(&path).unwrap();
        sim.run(&until, &mut reporter).unwrap();
        let summary = reporter.finish().unwrap();

        let mut rows = csv::Reader::from_path(&path).unwrap();
        assert_eq!(rows.records().count(), summary.reports);
        assert!(summary.reports > 0);
    }
}
