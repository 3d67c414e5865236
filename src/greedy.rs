// Week-by-week greedy commitment.
// Every week the remaining season is re-searched with that week's spreads, ranks and records, the pick
// carrying the most total path probability is committed, and the next week starts from it.

use crate::beam::{BeamSearch, BeamSettings, CancelFlag, RankedPath};
use crate::error::{Result, SurvivorError};
use crate::ingest::SeasonProvider;
use crate::predictor::WinPredictor;
use crate::season::WalkRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreedyPlan {
    pub year: u32,
    pub beam_width: usize,
    pub picks: Vec<String>,
}

/// Total probability of the paths taking each team at `position`, best first (ties by name)
pub fn score_picks(paths: &[RankedPath], position: usize) -> Vec<(String, f64)> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for path in paths {
        if let Some(team) = path.picks.get(position) {
            *totals.entry(team.as_str()).or_insert(0.0) += path.probability();
        }
    }
    let mut scored: Vec<(String, f64)> = totals.into_iter().map(|(t, p)| (t.to_string(), p)).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
}

pub struct GreedyPlanner<'a, D: SeasonProvider + ?Sized, P: WinPredictor + ?Sized> {
    pub data: &'a D,
    pub predictor: &'a P,
    pub settings: BeamSettings,
    cancel: CancelFlag,
}

impl<'a, D: SeasonProvider + ?Sized, P: WinPredictor + ?Sized> GreedyPlanner<'a, D, P> {
    pub fn new(data: &'a D, predictor: &'a P, settings: BeamSettings) -> Self {
        GreedyPlanner {
            data,
            predictor,
            settings,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan_year(&self, year: u32) -> Result<GreedyPlan> {
        let schedule = self.data.schedule(year)?;
        let max_week = schedule
            .max_week()
            .ok_or_else(|| SurvivorError::Data(format!("empty schedule for {}", year)))?;
        let search = BeamSearch::new(&schedule, self.predictor, self.settings).with_cancel(self.cancel.clone());

        let mut picks: Vec<String> = Vec::new();
        for week in 1..=max_week {
            let spread = self.data.spreads(year, week)?;
            let rank = self.data.ranks(year, week)?;
            let records = self.data.prior_records(year, week)?;

            let mut request = WalkRequest::new(week, max_week);
            request.spread = Some(&spread);
            request.rank = Some(&rank);
            request.prior_records = Some(&records);
            request.survivor_picks = &picks;

            let paths = search.resolve(&request)?;
            let scored = score_picks(&paths, picks.len());
            let Some((team, score)) = scored.into_iter().next() else {
                warn!("{} week {}: no paths left, stopping with {} picks", year, week, picks.len());
                break;
            };
            info!("{} week {}: committing {} ({:.4})", year, week, team, score);
            picks.push(team);
        }

        Ok(GreedyPlan {
            year,
            beam_width: self.settings.beam_width,
            picks,
        })
    }
}
