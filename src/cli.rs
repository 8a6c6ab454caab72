use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{settings::Style, Table, Tabled};
use termimad::MadSkin;

use crate::pipeline::{EvaluationScores, PipelineOptions, QueryOutcome, Stage, StageObserver};
use crate::tools::config::{AppConfig, Provider};

#[derive(Parser, Debug)]
#[command(
    name = "llm-websearch",
    version,
    about = "Answer questions with an LLM that searches DuckDuckGo when it needs to",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Question to answer. Starts an interactive session when omitted.
    pub query: Vec<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    #[arg(long)]
    pub model: Option<String>,

    /// Number of search results to fetch
    #[arg(short = 'n', long)]
    pub results: Option<usize>,

    /// Number of top-ranked pages scraped into the context
    #[arg(short = 'c', long)]
    pub context: Option<usize>,

    /// Always search instead of asking the model first; also skips evaluation
    #[arg(long)]
    pub always_search: bool,

    /// Skip the self-evaluation and refinement step
    #[arg(long)]
    pub no_evaluate: bool,

    #[arg(long)]
    pub no_follow_ups: bool,

    /// Print the full outcome as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show, search, export or clear answered queries
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        detailed: bool,
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long)]
        clear: bool,
    },
    /// List models available on the local Ollama server
    Models,
    /// Write the effective configuration to the config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse the command line. A subcommand word followed by arguments the
    /// subcommand does not take ("history of rome") is read as a question.
    pub fn parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        let error = match Self::try_parse_from(&args) {
            Ok(cli) => return Ok(cli),
            Err(e) if e.kind() == ErrorKind::UnknownArgument => e,
            Err(e) => return Err(e),
        };

        let subcommands: Vec<String> = Self::command()
            .get_subcommands()
            .map(|command| command.get_name().to_string())
            .collect();
        let Some(position) = args
            .iter()
            .skip(1)
            .position(|arg| arg.to_str().map_or(false, |arg| subcommands.iter().any(|s| s == arg)))
        else {
            return Err(error);
        };

        let mut as_query = args;
        as_query.insert(position + 1, OsString::from("--"));
        Self::try_parse_from(as_query).map_err(|_| error)
    }

    pub fn query_text(&self) -> Option<String> {
        let query = self.query.join(" ");
        let query = query.trim();
        (!query.is_empty()).then(|| query.to_string())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppConfig::default_path)
    }

    /// Command-line flags win over the config file.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(results) = self.results {
            config.num_search_results = results;
        }
        if let Some(context) = self.context {
            config.max_context_results = context;
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
    }

    pub fn pipeline_options(&self, config: &AppConfig) -> PipelineOptions {
        PipelineOptions {
            num_search_results: config.num_search_results,
            max_context_results: config.max_context_results,
            always_search: self.always_search,
            evaluate: !(self.no_evaluate || self.always_search),
            follow_ups: !self.no_follow_ups,
        }
    }
}

pub fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Shows pipeline progress on a spinner, one completed line per stage.
pub struct SpinnerObserver {
    spinner: ProgressBar,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self {
            spinner: new_spinner(),
        }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StageObserver for SpinnerObserver {
    fn on_stage(&self, stage: &Stage) {
        log::debug!("{}", stage);
        let previous = self.spinner.message();
        if !previous.is_empty() {
            self.spinner.println(format!("{} {}", "✓".green(), previous.dimmed()));
        }
        self.spinner.set_message(stage.to_string());
    }
}

pub fn print_header() {
    let term = Term::stdout();
    let _ = term.clear_screen();

    println!("{}", "╔══════════════════════════════════════╗".cyan());
    println!("{}", "║        🔎 LLM Web Search             ║".cyan());
    println!("{}", "╚══════════════════════════════════════╝".cyan());
    println!();
}

pub fn print_separator() {
    println!("{}", "─".repeat(50).dimmed());
}

#[derive(Tabled)]
pub struct ScoreRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Score")]
    pub score: String,
}

pub fn score_rows(scores: &EvaluationScores) -> Vec<ScoreRow> {
    scores
        .entries()
        .iter()
        .map(|(metric, score)| {
            let mut chars = metric.chars();
            let metric = chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default();
            ScoreRow {
                metric,
                score: format!("{}/10", score),
            }
        })
        .collect()
}

pub fn print_outcome(outcome: &QueryOutcome, model_name: &str) {
    println!();
    println!("{}", format!("🤖 {} Answer:", model_name).cyan().bold());
    println!("{}", "─".repeat(50).blue());
    MadSkin::default().print_text(&outcome.answer);
    println!("{}", "─".repeat(50).blue());

    if !outcome.sources.is_empty() {
        println!();
        println!("{}", "📚 Sources:".blue().bold());
        for (i, source) in outcome.sources.iter().enumerate() {
            println!(
                "  {}. {} {} {}",
                i + 1,
                source.hit.title,
                source.hit.url.dimmed(),
                format!("({}/10)", source.relevance_score).yellow()
            );
        }
    }

    if !outcome.follow_up_questions.is_empty() {
        println!();
        println!("{}", "💡 Potential follow-up questions:".blue().bold());
        for (i, question) in outcome.follow_up_questions.iter().take(3).enumerate() {
            println!(
                "  {}. {} {}",
                i + 1,
                question.question,
                format!("(Priority: {})", question.priority).dimmed()
            );
            println!("     {} {}", "Rationale:".dimmed(), question.rationale);
        }
    }

    if let Some(scores) = &outcome.evaluation {
        println!();
        println!("{}", "📊 Answer Evaluation:".blue().bold());
        let mut table = Table::new(score_rows(scores));
        table.with(Style::modern());
        println!("{}", table);
        for issue in &outcome.issues {
            println!("  {} {}", "⚠".yellow(), issue);
        }
    }

    println!();
    println!(
        "{} {:.2}s",
        "⏱ Completed in".dimmed(),
        outcome.elapsed_ms as f64 / 1000.0
    );
}

pub fn print_json(outcome: &QueryOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
