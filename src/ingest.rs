// This file is used to ingest the season tables from csv files and store them in structs used by the searches.
// The game features table holds one row per scheduled game (with spread and result when known),
// the ratings table holds one power rating per team per week, from which weekly ranks are derived.

use crate::error::{Result, SurvivorError};
use crate::game_result::{TeamRecord, TeamRecords};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Point spread per (home, away) for one week; `None` when no line was published
pub type SpreadTable = HashMap<(String, String), Option<f64>>;

/// Rank per team for one week, 1 = best
pub type RankTable = HashMap<String, u32>;

/// One row of the game features table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    #[serde(rename = "Year")]
    pub year: u32,
    #[serde(rename = "Week")]
    pub week: u32,
    #[serde(rename = "Home_Team")]
    pub home_team: String,
    #[serde(rename = "Away_Team")]
    pub away_team: String,
    #[serde(rename = "Is_Neutral", default, deserialize_with = "de_flag")]
    pub is_neutral: bool,
    #[serde(rename = "Home_Days_Since_Last_Game", default)]
    pub home_days_since_last_game: Option<f64>,
    #[serde(rename = "Away_Days_Since_Last_Game", default)]
    pub away_days_since_last_game: Option<f64>,
    #[serde(rename = "Spread", default)]
    pub spread: Option<f64>,
    /// Known only for games already played
    #[serde(rename = "Home_Won", default, deserialize_with = "de_opt_flag")]
    pub home_won: Option<bool>,
}

/// One row of the power ratings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRow {
    #[serde(rename = "Year")]
    pub year: u32,
    #[serde(rename = "Week")]
    pub week: u32,
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "Rating")]
    pub rating: f64,
}

fn de_opt_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some("1") | Some("1.0") | Some("true") | Some("True") | Some("TRUE") => Ok(Some(true)),
        Some("0") | Some("0.0") | Some("false") | Some("False") | Some("FALSE") => Ok(Some(false)),
        Some(other) => Err(D::Error::custom(format!("invalid boolean flag '{}'", other))),
    }
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(de_opt_flag(d)?.unwrap_or(false))
}

/// A game as the season engine sees it: who plays whom, and the static pre-game features
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
    pub is_neutral: bool,
    pub home_days_since_last_game: Option<f64>,
    pub away_days_since_last_game: Option<f64>,
}

impl ScheduledGame {
    pub fn new(week: u32, home_team: &str, away_team: &str) -> Self {
        ScheduledGame {
            week,
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            is_neutral: false,
            home_days_since_last_game: None,
            away_days_since_last_game: None,
        }
    }

    pub fn with_rest(mut self, home_days: f64, away_days: f64) -> Self {
        self.home_days_since_last_game = Some(home_days);
        self.away_days_since_last_game = Some(away_days);
        self
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// The other side of this game, if `team` plays in it
    pub fn opponent_of(&self, team: &str) -> Option<&str> {
        if self.home_team == team {
            Some(&self.away_team)
        } else if self.away_team == team {
            Some(&self.home_team)
        } else {
            None
        }
    }
}

impl From<&GameRow> for ScheduledGame {
    fn from(row: &GameRow) -> Self {
        ScheduledGame {
            week: row.week,
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            is_neutral: row.is_neutral,
            home_days_since_last_game: row.home_days_since_last_game,
            away_days_since_last_game: row.away_days_since_last_game,
        }
    }
}

/// A season's schedule grouped by week. Games within a week are ordered by home then away team.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub year: u32,
    weeks: BTreeMap<u32, Vec<ScheduledGame>>,
    teams: BTreeSet<String>,
}

impl Schedule {
    pub fn new(year: u32, games: Vec<ScheduledGame>) -> Self {
        let mut weeks: BTreeMap<u32, Vec<ScheduledGame>> = BTreeMap::new();
        let mut teams = BTreeSet::new();
        for game in games {
            teams.insert(game.home_team.clone());
            teams.insert(game.away_team.clone());
            weeks.entry(game.week).or_default().push(game);
        }
        for games in weeks.values_mut() {
            games.sort_by(|a, b| {
                a.home_team
                    .cmp(&b.home_team)
                    .then_with(|| a.away_team.cmp(&b.away_team))
            });
        }
        Schedule { year, weeks, teams }
    }

    pub fn games_in_week(&self, week: u32) -> &[ScheduledGame] {
        self.weeks.get(&week).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every team appearing anywhere in the schedule
    pub fn teams(&self) -> &BTreeSet<String> {
        &self.teams
    }

    pub fn teams_in_week(&self, week: u32) -> BTreeSet<String> {
        self.games_in_week(week)
            .iter()
            .flat_map(|g| [g.home_team.clone(), g.away_team.clone()])
            .collect()
    }

    pub fn max_week(&self) -> Option<u32> {
        self.weeks.keys().next_back().copied()
    }

    pub fn num_games(&self) -> usize {
        self.weeks.values().map(Vec::len).sum()
    }
}

/// The data collaborators a search needs, scoped by year and week
pub trait SeasonProvider {
    fn schedule(&self, year: u32) -> Result<Schedule>;

    fn spreads(&self, year: u32, week: u32) -> Result<SpreadTable>;

    fn ranks(&self, year: u32, week: u32) -> Result<RankTable>;

    /// Records built from every completed game before `week`
    fn prior_records(&self, year: u32, week: u32) -> Result<TeamRecords>;
}

/// In-memory copy of the game features and ratings tables
#[derive(Debug, Clone, Default)]
pub struct SeasonData {
    pub games: Vec<GameRow>,
    pub ratings: Vec<RatingRow>,
}

impl SeasonData {
    pub fn from_rows(games: Vec<GameRow>, ratings: Vec<RatingRow>) -> Self {
        SeasonData { games, ratings }
    }

    /// Load the game features csv and, if given, the ratings csv
    pub fn from_csv(games_path: impl AsRef<Path>, ratings_path: Option<&Path>) -> Result<Self> {
        let games = read_rows::<GameRow>(games_path.as_ref())?;
        let ratings = match ratings_path {
            Some(path) => read_rows::<RatingRow>(path)?,
            None => Vec::new(),
        };
        info!(
            "Loaded {} game rows and {} rating rows",
            games.len(),
            ratings.len()
        );
        Ok(SeasonData { games, ratings })
    }

    fn games_for(&self, year: u32) -> impl Iterator<Item = &GameRow> {
        self.games.iter().filter(move |g| g.year == year)
    }
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

impl SeasonProvider for SeasonData {
    fn schedule(&self, year: u32) -> Result<Schedule> {
        let games: Vec<ScheduledGame> = self.games_for(year).map(ScheduledGame::from).collect();
        if games.is_empty() {
            return Err(SurvivorError::Data(format!("no games scheduled for {}", year)));
        }
        Ok(Schedule::new(year, games))
    }

    fn spreads(&self, year: u32, week: u32) -> Result<SpreadTable> {
        Ok(self
            .games_for(year)
            .filter(|g| g.week == week)
            .map(|g| ((g.home_team.clone(), g.away_team.clone()), g.spread))
            .collect())
    }

    fn ranks(&self, year: u32, week: u32) -> Result<RankTable> {
        let mut rated: Vec<&RatingRow> = self
            .ratings
            .iter()
            .filter(|r| r.year == year && r.week == week)
            .collect();
        if rated.iter().any(|r| !r.rating.is_finite()) {
            return Err(SurvivorError::Data(format!(
                "non-finite rating in week {} of {}",
                week, year
            )));
        }
        rated.sort_by(|a, b| b.rating.total_cmp(&a.rating).then_with(|| a.team.cmp(&b.team)));

        Ok(rated
            .into_iter()
            .enumerate()
            .map(|(i, r)| (r.team.clone(), i as u32 + 1))
            .collect())
    }

    fn prior_records(&self, year: u32, week: u32) -> Result<TeamRecords> {
        let mut records: HashMap<String, TeamRecord> = HashMap::new();
        for game in self.games_for(year).filter(|g| g.week < week) {
            let Some(home_won) = game.home_won else {
                continue;
            };
            let (winner, loser) = if home_won {
                (&game.home_team, &game.away_team)
            } else {
                (&game.away_team, &game.home_team)
            };
            records.entry(winner.clone()).or_default().record_win();
            records.entry(loser.clone()).or_default().record_loss();
        }
        Ok(records.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMES_CSV: &str = "\
Year,Week,Home_Team,Away_Team,Is_Neutral,Home_Days_Since_Last_Game,Away_Days_Since_Last_Game,Spread,Home_Won
2024,1,Denver,Baltimore,0,7,7,-3.5,1
2024,1,Atlanta,Seattle,1,7,7,,0
2024,2,Baltimore,Atlanta,0,7,6,2.5,
2023,1,Denver,Seattle,0,7,7,1.0,1
";

    fn sample_data() -> SeasonData {
        let mut rdr = csv::Reader::from_reader(GAMES_CSV.as_bytes());
        let games: Vec<GameRow> = rdr.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        let ratings = vec![
            RatingRow { year: 2024, week: 2, team: "Seattle".into(), rating: 1.5 },
            RatingRow { year: 2024, week: 2, team: "Denver".into(), rating: 4.0 },
            RatingRow { year: 2024, week: 2, team: "Atlanta".into(), rating: 1.5 },
            RatingRow { year: 2024, week: 1, team: "Seattle".into(), rating: 9.0 },
        ];
        SeasonData::from_rows(games, ratings)
    }

    #[test]
    fn test_parse_game_rows() {
        let data = sample_data();
        assert_eq!(data.games.len(), 4);
        assert!(data.games[1].is_neutral);
        assert_eq!(data.games[1].spread, None);
        assert_eq!(data.games[0].home_won, Some(true));
        assert_eq!(data.games[2].home_won, None);
    }

    #[test]
    fn test_schedule_is_ordered_and_scoped_by_year() {
        let schedule = sample_data().schedule(2024).unwrap();
        let week1 = schedule.games_in_week(1);
        assert_eq!(week1.len(), 2);
        assert_eq!(week1[0].home_team, "Atlanta");
        assert_eq!(week1[1].home_team, "Denver");
        assert_eq!(schedule.max_week(), Some(2));
        assert_eq!(schedule.teams().len(), 4);
        assert!(schedule.games_in_week(7).is_empty());
        assert!(sample_data().schedule(1999).is_err());
    }

    #[test]
    fn test_spreads_for_week() {
        let spreads = sample_data().spreads(2024, 1).unwrap();
        assert_eq!(spreads.get(&("Denver".into(), "Baltimore".into())), Some(&Some(-3.5)));
        assert_eq!(spreads.get(&("Atlanta".into(), "Seattle".into())), Some(&None));
    }

    #[test]
    fn test_ranks_order_by_rating_then_name() {
        let ranks = sample_data().ranks(2024, 2).unwrap();
        assert_eq!(ranks["Denver"], 1);
        assert_eq!(ranks["Atlanta"], 2);
        assert_eq!(ranks["Seattle"], 3);
        assert!(!ranks.contains_key("Baltimore"));
    }

    #[test]
    fn test_prior_records_only_count_completed_earlier_games() {
        let records = sample_data().prior_records(2024, 3).unwrap();
        assert_eq!(records.get("Denver"), TeamRecord::new(1, 0));
        assert_eq!(records.get("Baltimore"), TeamRecord::new(0, 1));
        assert_eq!(records.get("Seattle"), TeamRecord::new(1, 0));
        assert_eq!(records.get("Atlanta"), TeamRecord::new(0, 1));

        let none_yet = sample_data().prior_records(2024, 1).unwrap();
        assert!(none_yet.is_empty());
    }
}
