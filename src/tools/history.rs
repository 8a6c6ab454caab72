use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::config::AppConfig;
use super::errors::PipelineError;
use crate::pipeline::QueryOutcome;

pub const MAX_HISTORY_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub answer: String,
    pub search_performed: bool,
    pub sources: Vec<String>,
}

impl From<&QueryOutcome> for HistoryEntry {
    fn from(outcome: &QueryOutcome) -> Self {
        Self {
            id: outcome.id.to_string(),
            timestamp: outcome.started_at,
            query: outcome.original_query.clone(),
            answer: outcome.answer.clone(),
            search_performed: outcome.search_performed,
            sources: outcome.sources.iter().map(|s| s.hit.url.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHistory {
    pub entries: VecDeque<HistoryEntry>,
    pub max_entries: usize,
}

impl QueryHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn add_entry(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Newest first
    pub fn get_recent(&self, count: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(count).collect()
    }

    pub fn search(&self, needle: &str, limit: usize) -> Vec<&HistoryEntry> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| {
                entry.query.to_lowercase().contains(&needle)
                    || entry.answer.to_lowercase().contains(&needle)
            })
            .rev()
            .take(limit)
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let mut content = String::from("# Query History\n\n");

        for entry in &self.entries {
            content.push_str(&format!("## {}\n\n", entry.timestamp.to_rfc3339()));
            content.push_str(&format!("**Query**: {}\n\n", entry.query));
            content.push_str(&format!("**Answer**: {}\n\n", entry.answer));

            if !entry.sources.is_empty() {
                content.push_str("**Sources**:\n");
                for source in &entry.sources {
                    content.push_str(&format!("- {}\n", source));
                }
                content.push('\n');
            }

            content.push_str("---\n\n");
        }

        content
    }
}

pub struct HistoryManager {
    history: QueryHistory,
    file_path: PathBuf,
}

impl HistoryManager {
    /// History lives next to the config file in use.
    pub fn path_for_config(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(AppConfig::data_dir)
            .join("history.json")
    }

    /// An unreadable history file starts a fresh history.
    pub fn open(file_path: PathBuf) -> Self {
        let history = Self::load_from_file(&file_path).unwrap_or_else(|e| {
            if file_path.exists() {
                log::warn!("ignoring unreadable history {}: {}", file_path.display(), e);
            }
            QueryHistory::new(MAX_HISTORY_ENTRIES)
        });

        Self { history, file_path }
    }

    pub fn record(&mut self, outcome: &QueryOutcome) -> Result<(), PipelineError> {
        self.history.add_entry(HistoryEntry::from(outcome));
        self.save_to_file()
    }

    pub fn get_recent(&self, count: usize) -> Vec<&HistoryEntry> {
        self.history.get_recent(count)
    }

    pub fn search(&self, needle: &str, limit: usize) -> Vec<&HistoryEntry> {
        self.history.search(needle, limit)
    }

    pub fn clear(&mut self) -> Result<(), PipelineError> {
        self.history.entries.clear();
        self.save_to_file()
    }

    pub fn export_markdown(&self, path: &Path) -> Result<(), PipelineError> {
        fs::write(path, self.history.to_markdown())
            .map_err(|e| PipelineError::io(e, Some(path.to_path_buf())))
    }

    fn save_to_file(&self) -> Result<(), PipelineError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(e, Some(parent.to_path_buf())))?;
        }

        let json = serde_json::to_string_pretty(&self.history)
            .map_err(|e| PipelineError::parse("history", e))?;
        fs::write(&self.file_path, json)
            .map_err(|e| PipelineError::io(e, Some(self.file_path.clone())))
    }

    fn load_from_file(path: &Path) -> Result<QueryHistory, PipelineError> {
        let content =
            fs::read_to_string(path).map_err(|e| PipelineError::io(e, Some(path.to_path_buf())))?;
        serde_json::from_str(&content).map_err(|e| PipelineError::parse("history", e))
    }

    pub fn show_entries(entries: &[&HistoryEntry], detailed: bool) {
        if entries.is_empty() {
            println!("{} No history entries found", "ℹ️".blue());
            return;
        }

        println!("{} {} entries found", "📜".cyan(), entries.len());
        println!();

        for (i, entry) in entries.iter().enumerate() {
            let marker = if entry.search_performed { "🌐" } else { "🧠" };
            println!(
                "{} {} {} {}",
                "●".blue(),
                (i + 1).to_string().yellow(),
                marker,
                entry.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed()
            );
            println!("   {} {}", "Query:".blue(), preview(&entry.query, 80));

            if detailed {
                println!("   {} {}", "Answer:".green(), preview(&entry.answer, 150));
                for source in &entry.sources {
                    println!("   {} {}", "↳".dimmed(), source.dimmed());
                }
            }

            println!();
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
