// Beam search over survivor paths.
// Each week every kept path is extended by every unused, rank-plausible team. The extension is a one-week
// season walk with the candidate forced to survive, charged ln(p) where p is the model's real chance that
// the candidate wins. The K best extensions by cumulative log probability form the next beam.

use crate::error::{Result, SurvivorError};
use crate::game::GameCache;
use crate::game_result::TeamRecords;
use crate::ingest::{RankTable, Schedule, ScheduledGame};
use crate::predictor::WinPredictor;
use crate::progress::progress_bar;
use crate::season::{PickPolicy, SeasonEngine, WalkRequest};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_RANK_MARGIN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSettings {
    /// Paths kept after each week (K)
    pub beam_width: usize,
    /// Independent repetitions of the whole search (n); results are concatenated
    pub runs: usize,
    pub rank_margin: u32,
    pub progress: bool,
    pub use_cache: bool,
}

impl Default for BeamSettings {
    fn default() -> Self {
        BeamSettings {
            beam_width: 100,
            runs: 1,
            rank_margin: DEFAULT_RANK_MARGIN,
            progress: false,
            use_cache: true,
        }
    }
}

/// Shared abort switch, checked between runs, between weeks and before each path expansion
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SurvivorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A partial path inside the beam; owns its records so siblings never share them
#[derive(Debug, Clone)]
pub struct SearchPath {
    pub picks: Vec<String>,
    pub log_probability: f64,
    pub team_records: TeamRecords,
}

/// A finished path as handed back to callers
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPath {
    /// Pre-seeded picks followed by one pick per searched week
    pub picks: Vec<String>,
    pub log_probability: f64,
}

impl RankedPath {
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }
}

impl From<SearchPath> for RankedPath {
    fn from(path: SearchPath) -> Self {
        RankedPath {
            picks: path.picks,
            log_probability: path.log_probability,
        }
    }
}

/// Drop teams whose rank is worse than their opponent's by more than `margin`.
/// Teams without a known rank, or facing an unranked opponent, are kept.
pub fn filter_by_rank(
    teams: &BTreeSet<String>,
    games: &[ScheduledGame],
    rank: Option<&RankTable>,
    margin: u32,
) -> BTreeSet<String> {
    let rank = match rank {
        Some(r) if !r.is_empty() => r,
        _ => return teams.clone(),
    };

    teams
        .iter()
        .filter(|team| {
            let opponent = games.iter().find_map(|g| g.opponent_of(team));
            match (rank.get(team.as_str()), opponent.and_then(|o| rank.get(o))) {
                (Some(&own), Some(&opp)) => own <= opp.saturating_add(margin),
                _ => true,
            }
        })
        .cloned()
        .collect()
}

/// Picks one fixed team and books it as a survivor
struct ForcedPick<'c> {
    team: &'c str,
}

impl PickPolicy for ForcedPick<'_> {
    fn select_pick(&mut self, _week: u32, _eligible: &BTreeSet<String>, _picks: &[String]) -> Option<String> {
        Some(self.team.to_string())
    }

    fn should_continue(&self, _pick: &str, _survived: bool) -> bool {
        true
    }

    fn forced_survival(&self) -> bool {
        true
    }
}

pub struct BeamSearch<'a, P: WinPredictor + ?Sized> {
    pub schedule: &'a Schedule,
    pub predictor: &'a P,
    pub settings: BeamSettings,
    cancel: CancelFlag,
}

impl<'a, P: WinPredictor + ?Sized> BeamSearch<'a, P> {
    pub fn new(schedule: &'a Schedule, predictor: &'a P, settings: BeamSettings) -> Self {
        BeamSearch {
            schedule,
            predictor,
            settings,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the search `runs` times over `request.start_week..=request.end_week` and concatenate the beams.
    /// Within one run the paths are ranked by log probability, best first.
    pub fn resolve(&self, request: &WalkRequest<'_>) -> Result<Vec<RankedPath>> {
        let cache = GameCache::new();
        let mut engine = SeasonEngine::new(self.schedule, self.predictor);
        if self.settings.use_cache {
            engine = engine.with_cache(&cache);
        }

        let mut ranked = Vec::new();
        for run in 0..self.settings.runs {
            self.cancel.check()?;
            let beam = self.run(&engine, request, run)?;
            ranked.extend(beam.into_iter().map(RankedPath::from));
        }

        info!(
            "beam search weeks {}-{}: {} paths, cache {} entries ({} hits, {} misses)",
            request.start_week,
            request.end_week,
            ranked.len(),
            cache.len(),
            cache.hits(),
            cache.misses()
        );
        Ok(ranked)
    }

    fn run(&self, engine: &SeasonEngine<'_, P>, request: &WalkRequest<'_>, run: usize) -> Result<Vec<SearchPath>> {
        let mut beam = vec![SearchPath {
            picks: request.survivor_picks.to_vec(),
            log_probability: 0.0,
            team_records: request.prior_records.cloned().unwrap_or_default(),
        }];

        let num_weeks = request.end_week.saturating_sub(request.start_week) as u64 + 1;
        let pb = progress_bar(num_weeks, &format!("Run {}", run + 1), self.settings.progress);

        for week in request.start_week..=request.end_week {
            self.cancel.check()?;
            let next = self.expand_week(engine, request, week, &beam)?;
            if next.is_empty() {
                warn!(
                    "week {}: no path could be extended, keeping {} paths through week {}",
                    week,
                    beam.len(),
                    week.saturating_sub(1)
                );
                break;
            }
            beam = next;
            debug!("week {}: beam holds {} paths", week, beam.len());
            pb.set_message(format!("Week {} ({} paths)", week, beam.len()));
            pb.inc(1);
        }
        pb.finish_and_clear();

        // The seed path only survives when not a single week could be searched
        if beam.len() == 1 && beam[0].picks.len() == request.survivor_picks.len() {
            return Ok(Vec::new());
        }
        Ok(beam)
    }

    /// Every (path, candidate) extension for `week`, best first, cut to the beam width
    pub fn expand_week(
        &self,
        engine: &SeasonEngine<'_, P>,
        request: &WalkRequest<'_>,
        week: u32,
        beam: &[SearchPath],
    ) -> Result<Vec<SearchPath>> {
        let games = self.schedule.games_in_week(week);
        let eligible = filter_by_rank(
            &self.schedule.teams_in_week(week),
            games,
            request.rank,
            self.settings.rank_margin,
        );

        // Parent order, then candidate name; the stable sort below keeps this order among equal scores
        let jobs: Vec<(&SearchPath, &String)> = beam
            .iter()
            .flat_map(|path| {
                eligible
                    .iter()
                    .filter(move |team| !path.picks.contains(team))
                    .map(move |team| (path, team))
            })
            .collect();

        let min_len = (jobs.len() / num_cpus::get()).max(1);
        let mut candidates = jobs
            .par_iter()
            .with_min_len(min_len)
            .map(|&(path, team)| {
                self.cancel.check()?;
                self.extend(engine, request, week, path, team)
            })
            .collect::<Result<Vec<SearchPath>>>()?;

        candidates.sort_by(|a, b| b.log_probability.total_cmp(&a.log_probability));
        candidates.truncate(self.settings.beam_width);
        Ok(candidates)
    }

    fn extend(
        &self,
        engine: &SeasonEngine<'_, P>,
        request: &WalkRequest<'_>,
        week: u32,
        path: &SearchPath,
        team: &str,
    ) -> Result<SearchPath> {
        let step = WalkRequest {
            start_week: week,
            end_week: week,
            spread: if week == request.start_week { request.spread } else { None },
            rank: request.rank,
            // Rank age counts from the week being expanded
            rank_week: week,
            prior_records: Some(&path.team_records),
            survivor_picks: &path.picks,
        };
        let outcome = engine.walk(&step, &mut ForcedPick { team })?;

        let p = outcome
            .results
            .get(&week)
            .and_then(|results| results.iter().find_map(|r| r.probability_for(team)))
            .ok_or_else(|| SurvivorError::Data(format!("{} has no game in week {}", team, week)))?;

        Ok(SearchPath {
            picks: outcome.picks,
            log_probability: path.log_probability + p.ln(),
            team_records: outcome.team_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::FixedPredictor;
    use crate::season::tests::{ranks, round_robin, spreads};
    use crate::features::RANK_AGE;
    use crate::predictor::ModelVariant;
    use approx::assert_relative_eq;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Prices every game from `Rank_Age` alone and keeps every input it was given
    struct RankAgeRecorder {
        features: Vec<String>,
        seen: Mutex<Vec<f64>>,
    }

    impl RankAgeRecorder {
        fn new() -> Self {
            RankAgeRecorder {
                features: vec![RANK_AGE.to_string()],
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl WinPredictor for RankAgeRecorder {
        fn feature_names(&self, _variant: ModelVariant) -> &[String] {
            &self.features
        }

        fn predict(&self, _variant: ModelVariant, inputs: &[f64]) -> Result<f64> {
            self.seen.lock().unwrap().extend_from_slice(inputs);
            Ok(0.6)
        }
    }

    fn settings(beam_width: usize) -> BeamSettings {
        BeamSettings {
            beam_width,
            ..BeamSettings::default()
        }
    }

    /// Probability that `pick` wins its week `week` game under FixedPredictor(full, no_spread)
    fn pick_probability(schedule: &Schedule, week: u32, pick: &str, full: f64, no_spread: f64) -> f64 {
        let home_p = if week == 1 { full } else { no_spread };
        let game = schedule
            .games_in_week(week)
            .iter()
            .find(|g| g.involves(pick))
            .unwrap();
        if game.home_team == pick {
            home_p
        } else {
            1.0 - home_p
        }
    }

    #[test]
    fn test_rank_filter_prunes_heavy_underdogs() {
        let rank: RankTable = [("A", 1), ("B", 2), ("C", 15)]
            .iter()
            .map(|(t, r)| (t.to_string(), *r))
            .collect();
        let teams: BTreeSet<String> = ["A", "C"].iter().map(|t| t.to_string()).collect();
        let games = vec![ScheduledGame::new(1, "A", "C")];
        let kept = filter_by_rank(&teams, &games, Some(&rank), 10);
        assert!(kept.contains("A"));
        assert!(!kept.contains("C"));

        let teams: BTreeSet<String> = ["A", "B"].iter().map(|t| t.to_string()).collect();
        let games = vec![ScheduledGame::new(1, "A", "B")];
        assert_eq!(filter_by_rank(&teams, &games, Some(&rank), 10), teams);
    }

    #[test]
    fn test_rank_filter_keeps_unranked_teams() {
        let rank: RankTable = [("A".to_string(), 1)].into_iter().collect();
        let teams: BTreeSet<String> = ["A", "Z"].iter().map(|t| t.to_string()).collect();
        let games = vec![ScheduledGame::new(1, "A", "Z")];
        assert_eq!(filter_by_rank(&teams, &games, Some(&rank), 0), teams);
        assert_eq!(filter_by_rank(&teams, &games, None, 0), teams);
    }

    #[test]
    fn test_rank_gap_equal_to_margin_is_kept() {
        let rank: RankTable = [("A".to_string(), 1), ("B".to_string(), 11), ("C".to_string(), 12)]
            .into_iter()
            .collect();
        let games = vec![ScheduledGame::new(1, "A", "B")];
        let teams: BTreeSet<String> = ["A", "B"].iter().map(|t| t.to_string()).collect();
        assert_eq!(filter_by_rank(&teams, &games, Some(&rank), 10), teams);

        let games = vec![ScheduledGame::new(1, "A", "C")];
        let teams: BTreeSet<String> = ["A", "C"].iter().map(|t| t.to_string()).collect();
        assert!(!filter_by_rank(&teams, &games, Some(&rank), 10).contains("C"));
    }

    #[test]
    fn test_rank_filter_handles_huge_margin() {
        let rank: RankTable = [("A".to_string(), 1), ("B".to_string(), 30)].into_iter().collect();
        let teams: BTreeSet<String> = ["A", "B"].iter().map(|t| t.to_string()).collect();
        let games = vec![ScheduledGame::new(1, "A", "B")];
        assert_eq!(filter_by_rank(&teams, &games, Some(&rank), u32::MAX), teams);
    }

    #[test]
    fn test_path_with_only_pruned_candidates_is_dropped() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        // D is far below everyone and is pruned every week
        let rank: RankTable = [("A", 1), ("B", 2), ("C", 3), ("D", 20)]
            .iter()
            .map(|(t, r)| (t.to_string(), *r))
            .collect();
        let mut request = WalkRequest::new(1, 6);
        request.rank = Some(&rank);

        let search = BeamSearch::new(&schedule, &predictor, settings(100));
        let engine = SeasonEngine::new(&schedule, &predictor);
        let path = |picks: &[&str]| SearchPath {
            picks: picks.iter().map(|t| t.to_string()).collect(),
            log_probability: 0.0,
            team_records: TeamRecords::new(),
        };
        // Only D is unused for the first path, and D is pruned
        let beam = vec![path(&["A", "B", "C"]), path(&["A"])];

        let next = search.expand_week(&engine, &request, 4, &beam).unwrap();
        let mut picks: Vec<Vec<String>> = next.into_iter().map(|p| p.picks).collect();
        picks.sort();
        assert_eq!(picks, vec![vec!["A", "B"], vec!["A", "C"]]);
    }

    #[test]
    fn test_expansions_see_zero_rank_age() {
        let schedule = round_robin();
        let predictor = RankAgeRecorder::new();
        let rank = ranks();
        let mut request = WalkRequest::new(1, 3);
        request.rank = Some(&rank);

        let mut s = settings(100);
        s.use_cache = false;
        let paths = BeamSearch::new(&schedule, &predictor, s).resolve(&request).unwrap();
        assert_eq!(paths.len(), 24);

        let seen = predictor.seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&age| age == 0.0), "rank ages seen: {:?}", *seen);
    }

    #[test]
    fn test_beam_grows_until_width() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 3);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        let search = BeamSearch::new(&schedule, &predictor, settings(100));
        let engine = SeasonEngine::new(&schedule, &predictor);
        let mut beam = vec![SearchPath {
            picks: Vec::new(),
            log_probability: 0.0,
            team_records: TeamRecords::new(),
        }];
        let mut sizes = Vec::new();
        for week in 1..=3 {
            beam = search.expand_week(&engine, &request, week, &beam).unwrap();
            sizes.push(beam.len());
        }
        assert_eq!(sizes, vec![4, 12, 24]);
    }

    #[test]
    fn test_beam_never_exceeds_width() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 4);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        for k in [1, 3, 5] {
            let search = BeamSearch::new(&schedule, &predictor, settings(k));
            let engine = SeasonEngine::new(&schedule, &predictor);
            let mut beam = vec![SearchPath {
                picks: Vec::new(),
                log_probability: 0.0,
                team_records: TeamRecords::new(),
            }];
            for week in 1..=4 {
                beam = search.expand_week(&engine, &request, week, &beam).unwrap();
                assert!(beam.len() <= k);
            }
        }
    }

    #[test]
    fn test_end_to_end_round_robin() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 6);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        let paths = BeamSearch::new(&schedule, &predictor, settings(10))
            .resolve(&request)
            .unwrap();
        assert!(!paths.is_empty());
        assert!(paths.len() <= 10);
        // Week 5 has no unused team left, so the week 4 beam is returned
        assert!(paths.iter().all(|p| p.picks.len() == 4));

        let top = &paths[0];
        for path in &paths {
            assert!(top.log_probability >= path.log_probability);

            let distinct: HashSet<&String> = path.picks.iter().collect();
            assert_eq!(distinct.len(), path.picks.len());
        }

        // Recompute the top score from its picks
        let expected: f64 = top
            .picks
            .iter()
            .enumerate()
            .map(|(i, pick)| pick_probability(&schedule, i as u32 + 1, pick, 0.8, 0.6).ln())
            .sum();
        assert_relative_eq!(top.log_probability, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_log_probability_is_sum_of_weekly_terms() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.7, 0.55);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 3);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        let paths = BeamSearch::new(&schedule, &predictor, settings(100))
            .resolve(&request)
            .unwrap();
        assert_eq!(paths.len(), 24);
        for path in &paths {
            let terms: Vec<f64> = path
                .picks
                .iter()
                .enumerate()
                .map(|(i, pick)| pick_probability(&schedule, i as u32 + 1, pick, 0.7, 0.55).ln())
                .collect();
            assert!(terms.iter().all(|t| *t <= 0.0));
            assert_relative_eq!(path.log_probability, terms.iter().sum::<f64>(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_preseeded_picks_are_skipped() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let rank = ranks();
        let picks = vec!["A".to_string(), "B".to_string()];
        let mut request = WalkRequest::new(3, 4);
        request.rank = Some(&rank);
        request.survivor_picks = &picks;

        let paths = BeamSearch::new(&schedule, &predictor, settings(100))
            .resolve(&request)
            .unwrap();
        // C and D remain: C-D and D-C
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert_eq!(&path.picks[..2], &picks[..]);
            assert_eq!(path.picks.len(), 4);
        }
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 2);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        let mut s = settings(5);
        s.runs = 2;
        let paths = BeamSearch::new(&schedule, &predictor, s).resolve(&request).unwrap();
        assert_eq!(paths.len(), 10);
        assert_eq!(paths[..5], paths[5..]);
    }

    #[test]
    fn test_cache_does_not_change_results() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let spread = spreads(&schedule);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 4);
        request.spread = Some(&spread);
        request.rank = Some(&rank);

        let cached = BeamSearch::new(&schedule, &predictor, settings(8))
            .resolve(&request)
            .unwrap();

        let mut s = settings(8);
        s.use_cache = false;
        let uncached = BeamSearch::new(&schedule, &predictor, s).resolve(&request).unwrap();

        assert_eq!(cached, uncached);
    }

    #[test]
    fn test_cancelled_search_returns_error() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        let rank = ranks();
        let mut request = WalkRequest::new(1, 3);
        request.rank = Some(&rank);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = BeamSearch::new(&schedule, &predictor, settings(10))
            .with_cancel(cancel)
            .resolve(&request)
            .unwrap_err();
        assert!(matches!(err, SurvivorError::Cancelled));
    }

    #[test]
    fn test_missing_feature_propagates() {
        let schedule = round_robin();
        let predictor = FixedPredictor::new(0.8, 0.6);
        // No ranks: the model cannot be evaluated
        let request = WalkRequest::new(1, 2);
        let err = BeamSearch::new(&schedule, &predictor, settings(10))
            .resolve(&request)
            .unwrap_err();
        assert!(matches!(err, SurvivorError::MissingFeature { .. }));
    }
}
