use std::collections::VecDeque;

use parse_display::Display;
use rand::distributions::Distribution;
use rand::Rng;
use rand_distr::Poisson;

use crate::utils::prelude::*;

/// Source of per-tick event counts.
///
/// The DAQ only knows the expected count for a tick; the source decides how the actual
/// count scatters around it.
pub trait CountSource {
    fn draw(&mut self, mean: f64) -> u64;
}

impl CountSource for Box<dyn CountSource> {
    #[inline]
    fn draw(&mut self, mean: f64) -> u64 {
        (**self).draw(mean)
    }
}

impl<C: CountSource + ?Sized> CountSource for &mut C {
    #[inline]
    fn draw(&mut self, mean: f64) -> u64 {
        (**self).draw(mean)
    }
}

/// Shot noise: counts follow a Poisson distribution around the mean
#[derive(Debug, Clone)]
pub struct PoissonCounts<R> {
    rng: R,
}

impl<R: Rng> PoissonCounts<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> CountSource for PoissonCounts<R> {
    fn draw(&mut self, mean: f64) -> u64 {
        // Poisson::new rejects a zero mean, which simply means nothing arrives
        if !(mean > 0.0) {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => dist.sample(&mut self.rng) as u64,
            Err(err) => {
                warn!(mean, %err, "unusable poisson mean, drawing nothing");
                0
            }
        }
    }
}

/// No noise: always the expected count, rounded to the nearest event
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanCounts;

impl CountSource for MeanCounts {
    fn draw(&mut self, mean: f64) -> u64 {
        if mean > 0.0 {
            mean.round() as u64
        } else {
            0
        }
    }
}

/// Replays a fixed list of counts, then keeps returning `fallback`
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    counts: VecDeque<u64>,
    fallback: u64,
}

impl Scripted {
    pub fn new(counts: impl IntoIterator<Item = u64>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
            fallback: 0,
        }
    }

    pub fn then(mut self, fallback: u64) -> Self {
        self.fallback = fallback;
        self
    }
}

impl CountSource for Scripted {
    fn draw(&mut self, _mean: f64) -> u64 {
        self.counts.pop_front().unwrap_or(self.fallback)
    }
}

/// How DAQ arrivals are drawn
#[derive(Debug, Clone, Copy, PartialEq, Display, serde::Deserialize, serde::Serialize)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArrivalModel {
    Poisson,
    Mean,
}

impl Default for ArrivalModel {
    fn default() -> Self {
        ArrivalModel::Poisson
    }
}

pub fn from_config(model: ArrivalModel, rng: impl Rng + 'static) -> Box<dyn CountSource> {
    info!(arrivals = %model, "using");
    match model {
        ArrivalModel::Poisson => Box::new(PoissonCounts::new(rng)),
        ArrivalModel::Mean => Box::new(MeanCounts),
    }
}
