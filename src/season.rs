// The season walk shared by every search strategy.
// A walk starts from seeded team records, and for each week builds every game's features,
// prices the week, asks a pick policy for this week's pick and books the results.
// Which team to pick, whether the pick is forced to survive, and when to stop belong to the policy.

use crate::error::{Result, SurvivorError};
use crate::features::{self, MatchupFeatures};
use crate::game::{Game, GameCache, Week};
use crate::game_result::{GameResult, TeamRecords};
use crate::ingest::{RankTable, Schedule, ScheduledGame, SpreadTable};
use crate::predictor::WinPredictor;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// The decisions a strategy plugs into the season walk
pub trait PickPolicy {
    /// Choose this week's pick from the teams not yet used. `None` means no legal pick exists.
    fn select_pick(&mut self, week: u32, eligible: &BTreeSet<String>, picks: &[String]) -> Option<String>;

    /// Called after the week is booked; returning false ends the walk
    fn should_continue(&self, pick: &str, survived: bool) -> bool;

    /// When true the pick is booked as its game's winner even if the model favoured the opponent
    fn forced_survival(&self) -> bool;
}

/// Inputs for one walk over `start_week..=end_week`
#[derive(Debug, Clone, Copy)]
pub struct WalkRequest<'r> {
    pub start_week: u32,
    pub end_week: u32,
    /// Applied to `start_week` only; later spreads are unknown at decision time
    pub spread: Option<&'r SpreadTable>,
    /// Applied every week when supplied
    pub rank: Option<&'r RankTable>,
    /// Week the ranks were published; `Rank_Age` counts weeks since then
    pub rank_week: u32,
    pub prior_records: Option<&'r TeamRecords>,
    /// Picks already committed before `start_week`
    pub survivor_picks: &'r [String],
}

impl<'r> WalkRequest<'r> {
    pub fn new(start_week: u32, end_week: u32) -> Self {
        WalkRequest {
            start_week,
            end_week,
            spread: None,
            rank: None,
            rank_week: start_week,
            prior_records: None,
            survivor_picks: &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// Results of every week walked, keyed by week
    pub results: BTreeMap<u32, Vec<GameResult>>,
    /// Pre-seeded picks followed by one pick per week walked
    pub picks: Vec<String>,
    /// Records after the last week walked
    pub team_records: TeamRecords,
}

pub struct SeasonEngine<'a, P: WinPredictor + ?Sized> {
    pub schedule: &'a Schedule,
    pub predictor: &'a P,
    pub cache: Option<&'a GameCache>,
}

impl<'a, P: WinPredictor + ?Sized> SeasonEngine<'a, P> {
    pub fn new(schedule: &'a Schedule, predictor: &'a P) -> Self {
        SeasonEngine {
            schedule,
            predictor,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a GameCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Features for one game given the records the current path has accumulated
    pub fn matchup_features(
        &self,
        game: &ScheduledGame,
        week: u32,
        request: &WalkRequest<'_>,
        records: &TeamRecords,
    ) -> MatchupFeatures {
        let mut f = MatchupFeatures::new();
        f.set(features::IS_NEUTRAL, Some(if game.is_neutral { 1.0 } else { 0.0 }));
        f.set(features::HOME_DAYS_SINCE_LAST_GAME, game.home_days_since_last_game);
        f.set(features::AWAY_DAYS_SINCE_LAST_GAME, game.away_days_since_last_game);

        if let Some(spread) = request.spread {
            if week == request.start_week {
                let line = spread
                    .get(&(game.home_team.clone(), game.away_team.clone()))
                    .copied()
                    .flatten();
                f.set(features::SPREAD, line);
            }
        }

        if let Some(rank) = request.rank {
            f.set(features::HOME_RANK, rank.get(&game.home_team).map(|&r| r as f64));
            f.set(features::AWAY_RANK, rank.get(&game.away_team).map(|&r| r as f64));
            f.set(features::RANK_AGE, Some(week as f64 - request.rank_week as f64));
        }

        let home = records.get(&game.home_team);
        let away = records.get(&game.away_team);
        f.set(features::HOME_GAMES_PLAYED, Some(home.games_played as f64));
        f.set(features::HOME_WINS, Some(home.wins as f64));
        f.set(features::HOME_LOSSES, Some(home.losses as f64));
        f.set(features::AWAY_GAMES_PLAYED, Some(away.games_played as f64));
        f.set(features::AWAY_WINS, Some(away.wins as f64));
        f.set(features::AWAY_LOSSES, Some(away.losses as f64));
        f
    }

    /// Build and price one week from the given records
    pub fn simulate_week(
        &self,
        week: u32,
        request: &WalkRequest<'_>,
        records: &TeamRecords,
    ) -> Result<Vec<GameResult>> {
        let games = self
            .schedule
            .games_in_week(week)
            .iter()
            .map(|g| {
                Game::new(
                    self.matchup_features(g, week, request, records),
                    &g.home_team,
                    &g.away_team,
                )
            })
            .collect();
        Week::new(games).simulate(self.predictor, self.cache)
    }

    /// Walk the season from `start_week` to `end_week`, or until the policy stops
    pub fn walk<S: PickPolicy + ?Sized>(&self, request: &WalkRequest<'_>, policy: &mut S) -> Result<WalkOutcome> {
        let mut records = request.prior_records.cloned().unwrap_or_default();
        let mut picks: Vec<String> = request.survivor_picks.to_vec();
        let mut eligible: BTreeSet<String> = self
            .schedule
            .teams()
            .iter()
            .filter(|t| !picks.contains(t))
            .cloned()
            .collect();
        let mut results = BTreeMap::new();

        for week in request.start_week..=request.end_week {
            let week_results = self.simulate_week(week, request, &records)?;

            let pick = policy
                .select_pick(week, &eligible, &picks)
                .ok_or(SurvivorError::NoEligibleTeam { week })?;
            eligible.remove(&pick);

            let forced = if policy.forced_survival() {
                Some(pick.as_str())
            } else {
                None
            };
            let mut survived = false;
            for result in &week_results {
                if let Some(pick) = forced {
                    survived |= records.apply(result, Some(pick));
                } else {
                    records.apply(result, None);
                    survived |= result.winner == pick;
                }
            }
            trace!("week {}: picked {} (survived: {})", week, pick, survived);

            let keep_going = policy.should_continue(&pick, survived);
            picks.push(pick);
            results.insert(week, week_results);
            if !keep_going {
                break;
            }
        }

        Ok(WalkOutcome {
            results,
            picks,
            team_records: records,
        })
    }
}
