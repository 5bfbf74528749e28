//! Run log for the review-retry workflow.
//!
//! Every run appends events to `.csm/runs.jsonl` in the project directory,
//! one JSON object per line. Artifacts are recorded by SHA-256 digest and
//! length, never by content.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A run log event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run: String,
    pub event: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Summary of one run rebuilt from its events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub client: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cycles: usize,
    pub rejections: usize,
    /// "accepted", "aborted", or "failed"; `None` while running or if the
    /// process died mid-run.
    pub outcome: Option<String>,
    pub duration_secs: Option<i64>,
}

/// Append-only JSONL run log
#[derive(Debug, Clone)]
pub struct RunLog {
    project_dir: PathBuf,
}

impl RunLog {
    /// Create a run log rooted at a project directory
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    /// Get the run log file path
    pub fn log_path(&self) -> PathBuf {
        Self::path_for(&self.project_dir)
    }

    /// Get the run log file path for a project
    pub fn path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(".csm/runs.jsonl")
    }

    /// Log an event
    pub fn log_event(&self, run: &str, event: &str, data: serde_json::Value) -> Result<()> {
        let path = self.log_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let run_event = RunEvent {
            run: run.to_string(),
            event: event.to_string(),
            timestamp: Utc::now(),
            data,
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let json = serde_json::to_string(&run_event)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all events, skipping lines that are not valid UTF-8 or JSON
    pub fn read_events(&self) -> Result<Vec<RunEvent>> {
        let path = self.log_path();

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).context("Failed to open run log")?;
        let reader = BufReader::new(file);

        let events = reader
            .lines()
            .filter_map(std::result::Result::ok)
            .filter_map(|line| serde_json::from_str::<RunEvent>(&line).ok())
            .collect();

        Ok(events)
    }

    /// Clear the run log
    pub fn clear(&self) -> Result<()> {
        let path = self.log_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Get summaries of the most recent runs, newest first
    pub fn recent_runs(&self, count: usize) -> Result<Vec<RunSummary>> {
        let events = self.read_events()?;

        let mut runs: HashMap<String, Vec<&RunEvent>> = HashMap::new();
        for event in &events {
            runs.entry(event.run.clone()).or_default().push(event);
        }

        let mut summaries: Vec<RunSummary> = runs
            .into_iter()
            .map(|(run_id, events)| build_summary(&run_id, &events))
            .collect();

        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(count);

        Ok(summaries)
    }

    /// Print run summaries
    pub fn print_summary(&self, runs: &[RunSummary]) {
        if runs.is_empty() {
            println!("No runs found.");
            return;
        }

        println!("\n{} Recent Runs", "History:".cyan().bold());
        println!("{}", "─".repeat(60));

        for (i, run) in runs.iter().enumerate() {
            let started = run
                .started_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "Unknown".to_string());

            let outcome = match run.outcome.as_deref() {
                Some("accepted") => "accepted".green().to_string(),
                Some("aborted") => "aborted".yellow().to_string(),
                Some(other) => other.red().to_string(),
                None => "incomplete".dimmed().to_string(),
            };

            println!(
                "\n{} Run {} ({})",
                format!("[{}]", i + 1).bright_blue(),
                &run.run_id[..8.min(run.run_id.len())],
                started
            );
            println!(
                "   Client: {} | Outcome: {}",
                run.client.as_deref().unwrap_or("unknown"),
                outcome
            );
            println!(
                "   Cycles: {} | Rejections: {} | Duration: {}",
                run.cycles,
                run.rejections,
                run.duration_secs
                    .map(|d| format!("{}s", d))
                    .unwrap_or_else(|| "-".to_string())
            );
        }

        println!("\n{}", "─".repeat(60));
    }
}

fn build_summary(run_id: &str, events: &[&RunEvent]) -> RunSummary {
    let mut summary = RunSummary {
        run_id: run_id.to_string(),
        client: None,
        started_at: None,
        ended_at: None,
        cycles: 0,
        rejections: 0,
        outcome: None,
        duration_secs: None,
    };

    for event in events {
        match event.event.as_str() {
            "run_start" => {
                summary.started_at = Some(event.timestamp);
                summary.client = event
                    .data
                    .get("client")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
            "cycle" => {
                summary.cycles += 1;
                if event.data.get("valid").and_then(|v| v.as_bool()) == Some(false) {
                    summary.rejections += 1;
                }
            }
            outcome @ ("accepted" | "aborted" | "failed") => {
                summary.ended_at = Some(event.timestamp);
                summary.outcome = Some(outcome.to_string());
            }
            _ => {}
        }
    }

    if let (Some(start), Some(end)) = (summary.started_at, summary.ended_at) {
        summary.duration_secs = Some((end - start).num_seconds());
    }

    summary
}

/// SHA-256 hex digest of an artifact.
pub fn artifact_digest(artifact: &str) -> String {
    hex::encode(Sha256::digest(artifact.as_bytes()))
}
