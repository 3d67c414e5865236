// Named numeric features describing one matchup in one week.
// The map is ordered by name so the cache key built from it is canonical.

use std::collections::BTreeMap;
use std::fmt::Write;

pub const IS_NEUTRAL: &str = "Is_Neutral";
pub const HOME_DAYS_SINCE_LAST_GAME: &str = "Home_Days_Since_Last_Game";
pub const AWAY_DAYS_SINCE_LAST_GAME: &str = "Away_Days_Since_Last_Game";
pub const SPREAD: &str = "Spread";
pub const HOME_RANK: &str = "Home_Rank";
pub const AWAY_RANK: &str = "Away_Rank";
pub const RANK_AGE: &str = "Rank_Age";
pub const HOME_GAMES_PLAYED: &str = "Home_Games_Played";
pub const AWAY_GAMES_PLAYED: &str = "Away_Games_Played";
pub const HOME_WINS: &str = "Home_Wins";
pub const AWAY_WINS: &str = "Away_Wins";
pub const HOME_LOSSES: &str = "Home_Losses";
pub const AWAY_LOSSES: &str = "Away_Losses";

/// Features the no-spread model is trained on; the full model adds `Spread`
pub const MODEL_FEATURES: [&str; 11] = [
    IS_NEUTRAL,
    HOME_RANK,
    AWAY_RANK,
    HOME_DAYS_SINCE_LAST_GAME,
    AWAY_DAYS_SINCE_LAST_GAME,
    HOME_GAMES_PLAYED,
    AWAY_GAMES_PLAYED,
    HOME_WINS,
    AWAY_WINS,
    HOME_LOSSES,
    AWAY_LOSSES,
];

/// Feature set for one game. A `None` value means the feature is known to be absent
/// (e.g. no spread published for this matchup), which differs from never being set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchupFeatures {
    values: BTreeMap<String, Option<f64>>,
}

impl MatchupFeatures {
    pub fn new() -> Self {
        MatchupFeatures::default()
    }

    pub fn set(&mut self, name: &str, value: Option<f64>) {
        self.values.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, Some(value));
        self
    }

    /// Value of a feature if it is present and non-null
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The full model needs a real spread; a null spread falls back to the no-spread model
    pub fn has_spread(&self) -> bool {
        self.get(SPREAD).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Canonical key: `name:value` pairs in name order, then home and away, joined by '-'.
    /// Identical features and the same ordered team pair always give the same key.
    pub fn cache_key(&self, home_team: &str, away_team: &str) -> String {
        let mut key = String::with_capacity(self.values.len() * 24 + home_team.len() + away_team.len());
        for (name, value) in &self.values {
            match value {
                Some(v) => {
                    let _ = write!(key, "{}:{}-", name, v);
                }
                None => {
                    let _ = write!(key, "{}:null-", name);
                }
            }
        }
        key.push_str(home_team);
        key.push('-');
        key.push_str(away_team);
        key
    }
}
