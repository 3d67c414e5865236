mod beam;
mod config;
mod error;
mod features;
mod game;
mod game_result;
mod greedy;
mod ingest;
mod monte_carlo;
mod predictor;
mod progress;
mod report;
mod season;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::{info, warn};

use crate::beam::BeamSearch;
use crate::config::{generate_sample_config, Config};
use crate::game::GameCache;
use crate::greedy::GreedyPlanner;
use crate::ingest::{SeasonData, SeasonProvider};
use crate::monte_carlo::MonteCarloSurvivor;
use crate::predictor::ModelPair;
use crate::report::{PathTable, ReportCard};
use crate::season::{SeasonEngine, WalkRequest};

#[derive(Parser)]
#[command(name = "survivor")]
#[command(about = "Survivor pool pick search: beam search, Monte Carlo and week-by-week greedy", long_about = None)]
struct Cli {
    /// Config file path (defaults to survivor.yaml if present)
    #[arg(short, long, env = "SURVIVOR_CONFIG")]
    config: Option<String>,

    /// Override the game features CSV
    #[arg(long)]
    games: Option<String>,

    /// Override the ratings CSV
    #[arg(long)]
    ratings: Option<String>,

    /// Override the model JSON
    #[arg(long)]
    model: Option<String>,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank survivor paths with beam search and write them to CSV
    Beam {
        #[arg(long)]
        year: u32,
        /// First week to search
        #[arg(long, default_value = "1")]
        week: u32,
        /// Last week to search (defaults to the last scheduled week)
        #[arg(long)]
        end_week: Option<u32>,
        /// Picks already used, in week order
        #[arg(long, value_delimiter = ',')]
        picks: Vec<String>,
        /// Beam width
        #[arg(short, long)]
        k: Option<usize>,
        /// Number of search runs
        #[arg(short, long)]
        n: Option<usize>,
        /// Output CSV; {year}, {week} and {k} are substituted
        #[arg(short, long, default_value = "results/beam_{year}_wk-{week}_k{k}.csv")]
        output: String,
    },
    /// Average survival length by first pick over random trajectories
    MonteCarlo {
        #[arg(long)]
        year: u32,
        #[arg(long, default_value = "1")]
        week: u32,
        #[arg(long)]
        end_week: Option<u32>,
        #[arg(long, value_delimiter = ',')]
        picks: Vec<String>,
        #[arg(short, long)]
        trajectories: Option<usize>,
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Commit one pick per week, re-searching the rest of the season each week
    Greedy {
        #[arg(long)]
        year_start: u32,
        #[arg(long)]
        year_end: u32,
        #[arg(short, long)]
        k: Option<usize>,
        /// Output JSON; {year} and {k} are substituted
        #[arg(short, long, default_value = "results/greedy_{year}_k{k}.json")]
        output: String,
    },
    /// Print the report card of an exported path CSV
    Report {
        path: String,
    },
    /// Write a sample configuration file
    InitConfig {
        #[arg(default_value = "survivor.yaml")]
        path: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref());
    if let Some(games) = &cli.games {
        config.data.games = games.clone();
    }
    if let Some(ratings) = &cli.ratings {
        config.data.ratings = ratings.clone();
    }
    if let Some(model) = &cli.model {
        config.model.path = model.clone();
    }
    if cli.quiet {
        config.search.progress = false;
    }

    match cli.command {
        Commands::Beam { year, week, end_week, picks, k, n, output } => {
            if let Some(k) = k {
                config.search.beam_width = k;
            }
            if let Some(n) = n {
                config.search.runs = n;
            }
            config.validate()?;

            let data = load_data(&config)?;
            let model = load_model(&config)?;
            let schedule = data.schedule(year)?;
            let end_week = resolve_end_week(end_week, schedule.max_week(), week)?;

            let spread = data.spreads(year, week)?;
            let rank = data.ranks(year, week)?;
            let records = data.prior_records(year, week)?;
            if rank.is_empty() {
                warn!("no ratings for {} week {}", year, week);
            }

            let mut request = WalkRequest::new(week, end_week);
            request.spread = Some(&spread);
            request.rank = Some(&rank);
            request.prior_records = Some(&records);
            request.survivor_picks = &picks;

            let paths = BeamSearch::new(&schedule, &model, config.to_beam_settings()).resolve(&request)?;

            let output = output
                .replace("{year}", &year.to_string())
                .replace("{week}", &week.to_string())
                .replace("{k}", &config.search.beam_width.to_string());
            PathTable::from_paths(&paths, week, end_week, picks.len())
                .write_file(&output)
                .with_context(|| format!("writing {}", output))?;
            info!("Wrote {} paths to {}", paths.len(), output);

            if let Some(best) = paths.first() {
                println!("Best path: {} (p = {:.6})", best.picks.join(", "), best.probability());
            }
        }
        Commands::MonteCarlo { year, week, end_week, picks, trajectories, seed } => {
            if let Some(t) = trajectories {
                config.monte_carlo.trajectories = t;
            }
            if let Some(s) = seed {
                config.monte_carlo.seed = s;
            }
            config.validate()?;

            let data = load_data(&config)?;
            let model = load_model(&config)?;
            let schedule = data.schedule(year)?;
            let end_week = resolve_end_week(end_week, schedule.max_week(), week)?;

            let spread = data.spreads(year, week)?;
            let rank = data.ranks(year, week)?;
            let records = data.prior_records(year, week)?;

            let mut request = WalkRequest::new(week, end_week);
            request.spread = Some(&spread);
            request.rank = Some(&rank);
            request.prior_records = Some(&records);
            request.survivor_picks = &picks;

            let cache = GameCache::new();
            let engine = SeasonEngine::new(&schedule, &model).with_cache(&cache);
            let mut mc = MonteCarloSurvivor::new(engine, config.monte_carlo.trajectories, config.monte_carlo.seed);
            mc.progress = config.search.progress;
            let summary = mc.resolve(&request)?;
            monte_carlo::print_summary(&summary);
        }
        Commands::Greedy { year_start, year_end, k, output } => {
            if year_end < year_start {
                bail!("--year-end ({}) is before --year-start ({})", year_end, year_start);
            }
            if let Some(k) = k {
                config.search.beam_width = k;
            }
            config.validate()?;

            let data = load_data(&config)?;
            let model = load_model(&config)?;
            let planner = GreedyPlanner::new(&data, &model, config.to_beam_settings());

            for year in year_start..=year_end {
                let plan = planner.plan_year(year)?;
                println!("{}: {}", year, plan.picks.join(", "));

                let path = output
                    .replace("{year}", &year.to_string())
                    .replace("{k}", &config.search.beam_width.to_string());
                if let Some(dir) = Path::new(&path).parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(&path, serde_json::to_string_pretty(&plan)?)
                    .with_context(|| format!("writing {}", path))?;
                info!("Wrote {}", path);
            }
        }
        Commands::Report { path } => {
            let table = PathTable::read_file(&path).with_context(|| format!("reading {}", path))?;
            ReportCard::new(&table).print();
        }
        Commands::InitConfig { path } => {
            if Path::new(&path).exists() {
                bail!("{} already exists", path);
            }
            std::fs::write(&path, generate_sample_config()).with_context(|| format!("writing {}", path))?;
            println!("Wrote sample configuration to {}", path);
        }
    }

    Ok(())
}

fn load_data(config: &Config) -> anyhow::Result<SeasonData> {
    SeasonData::from_csv(&config.data.games, Some(Path::new(&config.data.ratings)))
        .with_context(|| format!("loading {} and {}", config.data.games, config.data.ratings))
}

fn load_model(config: &Config) -> anyhow::Result<ModelPair> {
    ModelPair::from_file(&config.model.path).with_context(|| format!("loading model {}", config.model.path))
}

fn resolve_end_week(end_week: Option<u32>, max_week: Option<u32>, week: u32) -> anyhow::Result<u32> {
    let end_week = match end_week.or(max_week) {
        Some(w) => w,
        None => bail!("schedule has no weeks"),
    };
    if end_week < week {
        bail!("end week {} is before start week {}", end_week, week);
    }
    Ok(end_week)
}
