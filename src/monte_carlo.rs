// Monte Carlo survivor trajectories.
// Each trajectory picks uniformly at random among unused teams and stops the first week its pick loses.
// Trajectories are independent: each owns its records and an rng seeded from (seed + index),
// so a batch is reproducible for a fixed seed no matter how rayon schedules it.

use crate::error::Result;
use crate::predictor::WinPredictor;
use crate::progress::progress_bar;
use crate::season::{PickPolicy, SeasonEngine, WalkRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Random single-trajectory pick policy
pub struct RandomSurvivor<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomSurvivor<R> {
    pub fn new(rng: R) -> Self {
        RandomSurvivor { rng }
    }
}

impl<R: Rng> PickPolicy for RandomSurvivor<R> {
    fn select_pick(&mut self, week: u32, eligible: &BTreeSet<String>, picks: &[String]) -> Option<String> {
        if eligible.is_empty() {
            // Every team has been used: repeat the last pick so the walk can finish the week
            let last = picks.last().cloned();
            if let Some(team) = &last {
                warn!("week {}: no unused teams left, repeating {}", week, team);
            }
            return last;
        }
        let idx = self.rng.gen_range(0..eligible.len());
        eligible.iter().nth(idx).cloned()
    }

    fn should_continue(&self, _pick: &str, survived: bool) -> bool {
        survived
    }

    fn forced_survival(&self) -> bool {
        false
    }
}

/// Average survival length of the trajectories that opened with `team`
#[derive(Debug, Clone, PartialEq)]
pub struct FirstPickSummary {
    pub team: String,
    pub average_path_length: f64,
    pub trajectories: usize,
}

pub struct MonteCarloSurvivor<'a, P: WinPredictor + ?Sized> {
    pub engine: SeasonEngine<'a, P>,
    pub trajectories: usize,
    pub seed: u64,
    pub progress: bool,
}

impl<'a, P: WinPredictor + ?Sized> MonteCarloSurvivor<'a, P> {
    pub fn new(engine: SeasonEngine<'a, P>, trajectories: usize, seed: u64) -> Self {
        MonteCarloSurvivor {
            engine,
            trajectories,
            seed,
            progress: false,
        }
    }

    /// Run every trajectory; returns the picks made in each (pre-seeded picks excluded), in trajectory order
    pub fn trajectories(&self, request: &WalkRequest<'_>) -> Result<Vec<Vec<String>>> {
        let pb = progress_bar(self.trajectories as u64, "Trajectories", self.progress);
        let prefix = request.survivor_picks.len();
        let min_len = (self.trajectories / num_cpus::get()).max(1);

        let paths = (0..self.trajectories)
            .into_par_iter()
            .with_min_len(min_len)
            .map(|i| {
                let rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let outcome = self.engine.walk(request, &mut RandomSurvivor::new(rng))?;
                pb.inc(1);
                Ok(outcome.picks[prefix..].to_vec())
            })
            .collect::<Result<Vec<Vec<String>>>>();

        pb.finish_and_clear();
        paths
    }

    /// Average path length grouped by first pick, longest first
    pub fn resolve(&self, request: &WalkRequest<'_>) -> Result<Vec<FirstPickSummary>> {
        let paths = self.trajectories(request)?;
        let summary = summarize_first_picks(&paths);
        info!(
            "{} trajectories from week {}, {} distinct first picks",
            paths.len(),
            request.start_week,
            summary.len()
        );
        Ok(summary)
    }
}

pub fn summarize_first_picks(paths: &[Vec<String>]) -> Vec<FirstPickSummary> {
    let mut lengths: HashMap<&str, Vec<usize>> = HashMap::new();
    for path in paths {
        if let Some(first) = path.first() {
            lengths.entry(first.as_str()).or_default().push(path.len());
        }
    }

    let mut summary: Vec<FirstPickSummary> = lengths
        .into_iter()
        .map(|(team, lens)| FirstPickSummary {
            team: team.to_string(),
            average_path_length: lens.iter().sum::<usize>() as f64 / lens.len() as f64,
            trajectories: lens.len(),
        })
        .collect();
    summary.sort_by(|a, b| {
        b.average_path_length
            .total_cmp(&a.average_path_length)
            .then_with(|| a.team.cmp(&b.team))
    });
    summary
}

pub fn print_summary(summary: &[FirstPickSummary]) {
    println!("{:<20} {:>12} {:>8}", "Team", "Avg length", "Runs");
    println!("{}", "-".repeat(42));
    for row in summary {
        println!(
            "{:<20} {:>12.3} {:>8}",
            row.team, row.average_path_length, row.trajectories
        );
    }
}
