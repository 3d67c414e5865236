// This module defines the per-game results produced by a simulated week
// and the running win/loss records that every search path carries with it.
// Records are plain values: a path branches by cloning its parent's records and applying one week.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents the outcome of a single simulated game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub home_team: String,
    pub away_team: String,
    pub winner: String,
    /// Model probability that the home team wins, independent of `winner`
    pub probability: f64,
}

impl GameResult {
    pub fn new(home_team: &str, away_team: &str, winner: &str, probability: f64) -> Self {
        GameResult {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            winner: winner.to_string(),
            probability,
        }
    }

    /// Returns the losing team's name
    pub fn loser(&self) -> &str {
        if self.winner == self.home_team {
            &self.away_team
        } else {
            &self.home_team
        }
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// Probability that `team` wins this game, or None if it didn't play
    pub fn probability_for(&self, team: &str) -> Option<f64> {
        if self.home_team == team {
            Some(self.probability)
        } else if self.away_team == team {
            Some(1.0 - self.probability)
        } else {
            None
        }
    }
}

/// Win/loss record for one team. `wins + losses == games_played` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    pub games_played: u32,
}

impl TeamRecord {
    pub fn new(wins: u32, losses: u32) -> Self {
        TeamRecord {
            wins,
            losses,
            games_played: wins + losses,
        }
    }

    pub fn record_win(&mut self) {
        self.wins += 1;
        self.games_played += 1;
    }

    pub fn record_loss(&mut self) {
        self.losses += 1;
        self.games_played += 1;
    }
}

/// Records for every team that has been referenced so far in a walk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecords {
    records: HashMap<String, TeamRecord>,
}

impl TeamRecords {
    pub fn new() -> Self {
        TeamRecords::default()
    }

    /// Record for `team`, or an empty record if it hasn't played yet
    pub fn get(&self, team: &str) -> TeamRecord {
        self.records.get(team).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, team: &str, record: TeamRecord) {
        self.records.insert(team.to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TeamRecord)> {
        self.records.iter()
    }

    /// Total games played summed over all teams
    pub fn total_games_played(&self) -> u32 {
        self.records.values().map(|r| r.games_played).sum()
    }

    /// Apply one game result. With `forced_pick` set, a pick that played in this game
    /// is booked as the winner even when the model favoured its opponent.
    /// Returns true if `forced_pick` (when given) ends up as the booked winner.
    pub fn apply(&mut self, result: &GameResult, forced_pick: Option<&str>) -> bool {
        let (winner, loser) = match forced_pick {
            Some(pick) if result.involves(pick) && result.winner != pick => {
                (pick, result.winner.as_str())
            }
            _ => (result.winner.as_str(), result.loser()),
        };

        self.records.entry(winner.to_string()).or_default().record_win();
        self.records.entry(loser.to_string()).or_default().record_loss();

        forced_pick.map_or(false, |pick| pick == winner)
    }
}

impl FromIterator<(String, TeamRecord)> for TeamRecords {
    fn from_iter<I: IntoIterator<Item = (String, TeamRecord)>>(iter: I) -> Self {
        TeamRecords {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_for_flips_for_away_team() {
        let result = GameResult::new("A", "B", "A", 0.7);
        assert_eq!(result.probability_for("A"), Some(0.7));
        assert!((result.probability_for("B").unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(result.probability_for("C"), None);
        assert_eq!(result.loser(), "B");
    }

    #[test]
    fn test_apply_books_model_winner() {
        let mut records = TeamRecords::new();
        let result = GameResult::new("A", "B", "B", 0.4);
        records.apply(&result, None);

        assert_eq!(records.get("B"), TeamRecord::new(1, 0));
        assert_eq!(records.get("A"), TeamRecord::new(0, 1));
        assert_eq!(records.total_games_played(), 2);
    }

    #[test]
    fn test_apply_forced_pick_overrides_model_winner() {
        let mut records = TeamRecords::new();
        let result = GameResult::new("A", "B", "B", 0.4);
        let survived = records.apply(&result, Some("A"));

        assert!(survived);
        assert_eq!(records.get("A"), TeamRecord::new(1, 0));
        assert_eq!(records.get("B"), TeamRecord::new(0, 1));
    }

    #[test]
    fn test_apply_forced_pick_not_in_game() {
        let mut records = TeamRecords::new();
        let result = GameResult::new("C", "D", "C", 0.9);
        let survived = records.apply(&result, Some("A"));

        assert!(!survived);
        assert_eq!(records.get("C").wins, 1);
        assert_eq!(records.get("A"), TeamRecord::default());
    }

    #[test]
    fn test_cloned_records_do_not_alias() {
        let mut parent = TeamRecords::new();
        parent.insert("A", TeamRecord::new(2, 1));
        let mut child = parent.clone();
        child.apply(&GameResult::new("A", "B", "A", 0.6), None);

        assert_eq!(parent.get("A"), TeamRecord::new(2, 1));
        assert_eq!(child.get("A"), TeamRecord::new(3, 1));
    }
}
