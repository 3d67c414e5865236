// Ranked path export and the report card printed from an exported file.
// The table has one `week_<n>` column per searched week followed by `log_prob`.

use crate::beam::RankedPath;
use crate::error::{Result, SurvivorError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Write};
use std::path::Path;

const LOG_PROB: &str = "log_prob";
const WEEK_PREFIX: &str = "week_";

#[derive(Debug, Clone, PartialEq)]
pub struct PathRow {
    /// One cell per week column; `None` when the path stopped before that week
    pub picks: Vec<Option<String>>,
    pub log_probability: f64,
}

impl PathRow {
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTable {
    pub weeks: Vec<u32>,
    pub rows: Vec<PathRow>,
}

impl PathTable {
    /// Lay out beam output by week. Pre-seeded picks are dropped; the first search pick lands in `start_week`.
    pub fn from_paths(paths: &[RankedPath], start_week: u32, end_week: u32, preseeded: usize) -> Self {
        let weeks: Vec<u32> = (start_week..=end_week).collect();
        let rows = paths
            .iter()
            .map(|path| {
                let searched = path.picks.get(preseeded..).unwrap_or(&[]);
                let picks = (0..weeks.len()).map(|i| searched.get(i).cloned()).collect();
                PathRow {
                    picks,
                    log_probability: path.log_probability,
                }
            })
            .collect();
        PathTable { weeks, rows }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header: Vec<String> = self.weeks.iter().map(|w| format!("{}{}", WEEK_PREFIX, w)).collect();
        header.push(LOG_PROB.to_string());
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = row.picks.iter().map(|p| p.clone().unwrap_or_default()).collect();
            record.push(row.log_probability.to_string());
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        self.write_csv(std::fs::File::create(path)?)
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let mut week_columns = Vec::new();
        let mut weeks = Vec::new();
        let mut log_prob_column = None;
        for (i, name) in headers.iter().enumerate() {
            if name == LOG_PROB {
                log_prob_column = Some(i);
            } else if let Some(week) = name.strip_prefix(WEEK_PREFIX) {
                let week = week
                    .parse::<u32>()
                    .map_err(|_| SurvivorError::Data(format!("bad week column '{}'", name)))?;
                week_columns.push(i);
                weeks.push(week);
            }
        }
        let log_prob_column =
            log_prob_column.ok_or_else(|| SurvivorError::Data(format!("missing '{}' column", LOG_PROB)))?;

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let picks = week_columns
                .iter()
                .map(|&i| match record.get(i).map(str::trim) {
                    None | Some("") => None,
                    Some(team) => Some(team.to_string()),
                })
                .collect();
            let raw = record.get(log_prob_column).unwrap_or("");
            let log_probability = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| SurvivorError::Data(format!("bad log_prob '{}'", raw)))?;
            rows.push(PathRow {
                picks,
                log_probability,
            });
        }
        Ok(PathTable { weeks, rows })
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_csv(std::fs::File::open(path)?)
    }
}

/// Summary of an exported path table
#[derive(Debug, Clone, PartialEq)]
pub struct ReportCard {
    pub weeks: Vec<u32>,
    pub most_probable: Option<PathRow>,
    pub total_probability: f64,
    /// Best teams for the first week: (team, cumulative probability, share of total)
    pub first_week: Vec<(String, f64, f64)>,
    /// For each team, its best weeks by share of total probability
    pub team_weeks: BTreeMap<String, Vec<(u32, f64)>>,
}

impl ReportCard {
    pub const TOP_FIRST_WEEK: usize = 5;
    pub const TOP_WEEKS_PER_TEAM: usize = 3;

    pub fn new(table: &PathTable) -> Self {
        let most_probable = table
            .rows
            .iter()
            .fold(None::<&PathRow>, |best, row| match best {
                Some(b) if b.log_probability >= row.log_probability => Some(b),
                _ => Some(row),
            })
            .cloned();
        let total_probability: f64 = table.rows.iter().map(PathRow::probability).sum();
        let share = |p: f64| if total_probability > 0.0 { p / total_probability } else { 0.0 };

        let mut first: HashMap<&str, f64> = HashMap::new();
        for row in &table.rows {
            if let Some(Some(team)) = row.picks.first() {
                *first.entry(team.as_str()).or_insert(0.0) += row.probability();
            }
        }
        let mut first_week: Vec<(String, f64, f64)> = first
            .into_iter()
            .map(|(team, p)| (team.to_string(), p, share(p)))
            .collect();
        first_week.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        first_week.truncate(Self::TOP_FIRST_WEEK);

        let teams: BTreeSet<&str> = table
            .rows
            .iter()
            .flat_map(|row| row.picks.iter().flatten().map(String::as_str))
            .collect();
        let mut team_weeks = BTreeMap::new();
        for team in teams {
            let mut by_week: Vec<(u32, f64)> = table
                .weeks
                .iter()
                .enumerate()
                .map(|(i, &week)| {
                    let p: f64 = table
                        .rows
                        .iter()
                        .filter(|row| row.picks.get(i).and_then(|c| c.as_deref()) == Some(team))
                        .map(PathRow::probability)
                        .sum();
                    (week, share(p))
                })
                .filter(|(_, s)| *s > 0.0)
                .collect();
            by_week.sort_by(|a, b| b.1.total_cmp(&a.1));
            by_week.truncate(Self::TOP_WEEKS_PER_TEAM);
            team_weeks.insert(team.to_string(), by_week);
        }

        ReportCard {
            weeks: table.weeks.clone(),
            most_probable,
            total_probability,
            first_week,
            team_weeks,
        }
    }

    pub fn print(&self) {
        println!("\n=== Most Probable Path ===");
        match &self.most_probable {
            Some(row) => {
                for (week, pick) in self.weeks.iter().zip(&row.picks) {
                    println!("week_{}: {}", week, pick.as_deref().unwrap_or("-"));
                }
                println!("log_prob: {:.6}", row.log_probability);
            }
            None => println!("(no paths)"),
        }

        if let Some(week) = self.weeks.first() {
            println!("\n=== Top {} teams for week_{} ===", Self::TOP_FIRST_WEEK, week);
            for (team, p, share) in &self.first_week {
                println!("{:<20} {:.4} ({:.2}%)", team, p, share * 100.0);
            }
        }

        println!("\n=== Top {} weeks to pick each team ===", Self::TOP_WEEKS_PER_TEAM);
        for (team, weeks) in &self.team_weeks {
            println!("{}:", team);
            for (week, share) in weeks {
                println!("  week_{}: {:.2}%", week, share * 100.0);
            }
        }
        println!();
    }
}
