// Configuration module for the survivor pool search
// Supports YAML configuration files for data locations, the model file, and search settings

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::beam::BeamSettings;
use crate::error::{Result, SurvivorError};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub monte_carlo: MonteCarloSettings,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(SurvivorError::Config(format!("config file not found: {}", path)));
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load_or_default(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::from_file(p).unwrap_or_else(|e| {
                warn!("{}; using default configuration", e);
                Self::default()
            }),
            None => {
                // Try default locations
                for default_path in &["survivor.yaml", "survivor.yml", ".survivor.yaml"] {
                    if Path::new(default_path).exists() {
                        match Self::from_file(default_path) {
                            Ok(config) => {
                                info!("Loaded configuration from {}", default_path);
                                return config;
                            }
                            Err(e) => warn!("Ignoring {}: {}", default_path, e),
                        }
                    }
                }
                Self::default()
            }
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.beam_width == 0 {
            return Err(SurvivorError::Config("search.beam_width must be at least 1".into()));
        }
        if self.search.runs == 0 {
            return Err(SurvivorError::Config("search.runs must be at least 1".into()));
        }
        if self.monte_carlo.trajectories == 0 {
            return Err(SurvivorError::Config("monte_carlo.trajectories must be at least 1".into()));
        }
        Ok(())
    }

    /// Convert search settings to BeamSettings
    pub fn to_beam_settings(&self) -> BeamSettings {
        BeamSettings {
            beam_width: self.search.beam_width,
            runs: self.search.runs,
            rank_margin: self.search.rank_margin,
            progress: self.search.progress,
            use_cache: self.search.use_cache,
        }
    }
}

/// Input tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Game features CSV (schedule, rest days, spreads, results)
    #[serde(default = "default_games")]
    pub games: String,

    /// Power ratings CSV; ranks are derived from it per week
    #[serde(default = "default_ratings")]
    pub ratings: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            games: default_games(),
            ratings: default_ratings(),
        }
    }
}

fn default_games() -> String { "data/game_features.csv".to_string() }
fn default_ratings() -> String { "data/nfl_rankings.csv".to_string() }

/// Win probability model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// JSON file holding the full and no-spread logistic models
    #[serde(default = "default_model_path")]
    pub path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            path: default_model_path(),
        }
    }
}

fn default_model_path() -> String { "models/logistic.json".to_string() }

/// Beam search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Paths kept after each week
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,

    /// Number of times the search is repeated
    #[serde(default = "default_runs")]
    pub runs: usize,

    /// Prune a team ranked more than this many places below its opponent
    #[serde(default = "default_rank_margin")]
    pub rank_margin: u32,

    /// Show progress bars
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Memoize game evaluations for the duration of a search
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            beam_width: default_beam_width(),
            runs: default_runs(),
            rank_margin: default_rank_margin(),
            progress: default_progress(),
            use_cache: default_use_cache(),
        }
    }
}

fn default_beam_width() -> usize { 100 }
fn default_runs() -> usize { 1 }
fn default_rank_margin() -> u32 { crate::beam::DEFAULT_RANK_MARGIN }
fn default_progress() -> bool { true }
fn default_use_cache() -> bool { true }

/// Monte Carlo trajectory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSettings {
    #[serde(default = "default_trajectories")]
    pub trajectories: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        MonteCarloSettings {
            trajectories: default_trajectories(),
            seed: default_seed(),
        }
    }
}

fn default_trajectories() -> usize { 1000 }
fn default_seed() -> u64 { 42 }

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    r#"# Survivor Pool Search Configuration
# All values shown are defaults - uncomment and modify as needed

# Input tables
data:
  # Year,Week,Home_Team,Away_Team,Is_Neutral,Home_Days_Since_Last_Game,Away_Days_Since_Last_Game,Spread,Home_Won
  games: "data/game_features.csv"
  # Year,Week,Team,Rating
  ratings: "data/nfl_rankings.csv"

# Win probability model (logistic regression, full and no-spread variants)
model:
  path: "models/logistic.json"

# Beam search settings
search:
  # Paths kept after each week (higher = broader search but slower)
  beam_width: 100
  # Number of times the whole search is repeated
  runs: 1
  # Skip teams ranked more than this many places below their opponent
  rank_margin: 10
  # Show progress bars
  progress: true
  # Cache game evaluations during a search
  use_cache: true

# Monte Carlo settings
monte_carlo:
  # Number of random survivor trajectories
  trajectories: 1000
  # Seed for reproducible trajectories
  seed: 42
"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.beam_width, 100);
        assert_eq!(config.search.rank_margin, 10);
        assert_eq!(config.monte_carlo.trajectories, 1000);
        assert_eq!(config.data.games, "data/game_features.csv");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
search:
  beam_width: 5000
  progress: false
monte_carlo:
  seed: 7
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.search.beam_width, 5000);
        assert!(!config.search.progress);
        assert_eq!(config.monte_carlo.seed, 7);
        // Defaults should still work
        assert_eq!(config.search.runs, 1);
        assert_eq!(config.model.path, "models/logistic.json");
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config: Config = serde_yaml::from_str(&generate_sample_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_beam_settings_conversion() {
        let mut config = Config::default();
        config.search.beam_width = 10;
        config.search.use_cache = false;
        let settings = config.to_beam_settings();
        assert_eq!(settings.beam_width, 10);
        assert_eq!(settings.runs, 1);
        assert!(!settings.use_cache);
        assert!(settings.progress);
    }

    #[test]
    fn test_zero_beam_width_is_rejected() {
        let mut config = Config::default();
        config.search.beam_width = 0;
        assert!(matches!(config.validate(), Err(SurvivorError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("survivor-config-{}.yaml", std::process::id()));
        let path = path.to_str().unwrap();
        let mut config = Config::default();
        config.search.beam_width = 250;
        config.monte_carlo.seed = 9;
        config.save_to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, SurvivorError::Config(_)));
    }
}
