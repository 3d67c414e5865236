// This contains the per-game pricing used by every search.
// The Game struct turns one matchup's features into a winner and a home win probability.
// The GameCache memoizes those results for a whole search run, so identical matchup states
// reached through different candidate paths are priced once.
// The Week struct fans a week's games out through the cache in schedule order.

use crate::error::{Result, SurvivorError};
use crate::features::MatchupFeatures;
use crate::game_result::GameResult;
use crate::predictor::{ModelVariant, WinPredictor};
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub features: MatchupFeatures,
    pub home_team: String,
    pub away_team: String,
}

impl Game {
    pub fn new(features: MatchupFeatures, home_team: &str, away_team: &str) -> Game {
        Game {
            features,
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
        }
    }

    /// Which model prices this game: the full model needs a non-null spread
    pub fn variant(&self) -> ModelVariant {
        if self.features.has_spread() {
            ModelVariant::Full
        } else {
            ModelVariant::NoSpread
        }
    }

    /// Run the predictor without consulting any cache.
    /// Returns (winner, probability that the home team wins); home wins ties at 0.5.
    pub fn simulate<P: WinPredictor + ?Sized>(&self, predictor: &P) -> Result<(String, f64)> {
        let variant = self.variant();
        let inputs = predictor
            .feature_names(variant)
            .iter()
            .map(|name| {
                self.features
                    .get(name)
                    .ok_or_else(|| SurvivorError::MissingFeature {
                        feature: name.clone(),
                        home: self.home_team.clone(),
                        away: self.away_team.clone(),
                    })
            })
            .collect::<Result<Vec<f64>>>()?;

        let prob = predictor.predict(variant, &inputs)?;
        if !(0.0..=1.0).contains(&prob) {
            return Err(SurvivorError::Predictor(format!(
                "probability {} out of range for {} vs {}",
                prob, self.home_team, self.away_team
            )));
        }

        let winner = if prob >= 0.5 {
            self.home_team.clone()
        } else {
            self.away_team.clone()
        };
        Ok((winner, prob))
    }

    /// Price the game through `cache` when one is given
    pub fn simulate_cached<P: WinPredictor + ?Sized>(
        &self,
        predictor: &P,
        cache: Option<&GameCache>,
    ) -> Result<(String, f64)> {
        match cache {
            Some(cache) => cache.evaluate(predictor, self),
            None => self.simulate(predictor),
        }
    }
}

/// Run-scoped memo of game outcomes keyed by the canonical feature encoding plus the team pair.
/// Safe for concurrent use; two workers racing on the same miss both compute and the
/// second insert overwrites the first with an identical value.
/// Entries are never evicted, the cache is dropped with the run that owns it.
#[derive(Debug)]
pub struct GameCache {
    entries: DashMap<String, (String, f64), FnvBuildHasher>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for GameCache {
    fn default() -> Self {
        GameCache::new()
    }
}

impl GameCache {
    pub fn new() -> Self {
        GameCache {
            entries: DashMap::with_hasher(FnvBuildHasher::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn evaluate<P: WinPredictor + ?Sized>(&self, predictor: &P, game: &Game) -> Result<(String, f64)> {
        let key = game.features.cache_key(&game.home_team, &game.away_team);

        if let Some(entry) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value().clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = game.simulate(predictor)?;
        self.entries.insert(key, result.clone());
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// The games scheduled in one week
#[derive(Debug, Clone, Default)]
pub struct Week {
    pub games: Vec<Game>,
}

impl Week {
    pub fn new(games: Vec<Game>) -> Week {
        Week { games }
    }

    /// One result per game, in schedule order
    pub fn simulate<P: WinPredictor + ?Sized>(
        &self,
        predictor: &P,
        cache: Option<&GameCache>,
    ) -> Result<Vec<GameResult>> {
        self.games
            .iter()
            .map(|game| {
                let (winner, probability) = game.simulate_cached(predictor, cache)?;
                Ok(GameResult::new(&game.home_team, &game.away_team, &winner, probability))
            })
            .collect()
    }
}
