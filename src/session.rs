use colored::Colorize;
use dialoguer::Input;
use std::sync::Arc;

use crate::cli::{print_header, print_outcome, print_separator, SpinnerObserver};
use crate::pipeline::{FollowUpQuestion, SearchPipeline};
use crate::tools::history::HistoryManager;

#[derive(Debug, PartialEq)]
enum SessionCommand {
    Exit,
    History,
    Empty,
    Ask(String),
}

pub struct AssistantSession {
    pipeline: SearchPipeline,
    history: Option<HistoryManager>,
    last_follow_ups: Vec<FollowUpQuestion>,
}

impl AssistantSession {
    pub fn new(pipeline: SearchPipeline, history: Option<HistoryManager>) -> Self {
        Self {
            pipeline,
            history,
            last_follow_ups: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.show_welcome();

        loop {
            let user_input = match self.get_user_input() {
                Ok(input) => input,
                Err(_) => {
                    println!("\n{}", "Session ended by user".yellow());
                    break;
                }
            };

            match self.parse_command(&user_input) {
                SessionCommand::Exit => {
                    println!("{}", "Goodbye! 👋".cyan());
                    break;
                }
                SessionCommand::History => self.show_history(),
                SessionCommand::Empty => continue,
                SessionCommand::Ask(query) => self.ask(&query).await,
            }

            println!();
        }

        Ok(())
    }

    /// Answer one query, print it and remember it.
    pub async fn ask(&mut self, query: &str) {
        let observer = Arc::new(SpinnerObserver::new());
        self.pipeline.set_observer(observer.clone());

        let outcome = self.pipeline.process_query(query).await;
        observer.finish();

        print_outcome(&outcome, self.pipeline.model_name());

        if let Some(history) = self.history.as_mut() {
            if let Err(e) = history.record(&outcome) {
                log::warn!("could not save history: {}", e);
            }
        }

        self.last_follow_ups = outcome.follow_up_questions;
        if !self.last_follow_ups.is_empty() {
            println!(
                "{}",
                "Type 1-3 to ask a suggested follow-up question".dimmed()
            );
        }
    }

    fn show_welcome(&self) {
        print_header();
        println!("{}", "🤖 LLM with DuckDuckGo Web Search".cyan().bold());
        println!("Model: {}", self.pipeline.model_name().yellow());
        println!();
        println!("{}", "For each question I will:".blue());
        println!("  {} Decide whether a web search is needed", "•".blue());
        println!("  {} Search, rank and read the best pages", "•".blue());
        println!("  {} Answer, self-check and suggest follow-ups", "•".blue());
        println!();
        println!(
            "{}",
            "Type 'history' to see past queries, 'quit' or 'exit' to end the session".dimmed()
        );
        println!();
    }

    fn show_history(&self) {
        match &self.history {
            Some(history) => HistoryManager::show_entries(&history.get_recent(5), false),
            None => println!("{} History is disabled in the config", "ℹ️".blue()),
        }
    }

    fn parse_command(&self, input: &str) -> SessionCommand {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();

        if matches!(lower.as_str(), "quit" | "exit" | "bye" | "goodbye") {
            return SessionCommand::Exit;
        }
        if lower == "history" {
            return SessionCommand::History;
        }
        if trimmed.is_empty() {
            return SessionCommand::Empty;
        }

        if let Ok(choice) = trimmed.parse::<usize>() {
            if let Some(follow_up) = choice
                .checked_sub(1)
                .filter(|i| *i < 3)
                .and_then(|i| self.last_follow_ups.get(i))
            {
                println!("{} {}", "↪".cyan(), follow_up.question.yellow());
                return SessionCommand::Ask(follow_up.question.clone());
            }
        }

        SessionCommand::Ask(trimmed.to_string())
    }

    fn get_user_input(&self) -> anyhow::Result<String> {
        print_separator();

        let input: String = Input::new()
            .with_prompt("🔎 What would you like to know?")
            .allow_empty(true)
            .interact_text()?;

        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_engine, ScriptedModel};
    use crate::pipeline::PipelineOptions;
    use httpmock::MockServer;

    fn session() -> AssistantSession {
        let server = MockServer::start();
        let pipeline = SearchPipeline::new(
            Arc::new(ScriptedModel::failing()),
            test_engine(&server),
            PipelineOptions::default(),
        );
        AssistantSession::new(pipeline, None)
    }

    fn follow_up(question: &str) -> FollowUpQuestion {
        FollowUpQuestion {
            question: question.to_string(),
            rationale: String::new(),
            priority: 3.0,
        }
    }

    #[test]
    fn recognises_exit_and_history_words() {
        let session = session();

        assert_eq!(session.parse_command("  Quit "), SessionCommand::Exit);
        assert_eq!(session.parse_command("goodbye"), SessionCommand::Exit);
        assert_eq!(session.parse_command("HISTORY"), SessionCommand::History);
        assert_eq!(session.parse_command("   "), SessionCommand::Empty);
        assert_eq!(
            session.parse_command(" what is tokio? "),
            SessionCommand::Ask("what is tokio?".to_string())
        );
    }

    #[test]
    fn numbers_pick_suggested_follow_ups() {
        let mut session = session();
        session.last_follow_ups = vec![follow_up("First?"), follow_up("Second?")];

        assert_eq!(session.parse_command("2"), SessionCommand::Ask("Second?".to_string()));
        assert_eq!(session.parse_command("3"), SessionCommand::Ask("3".to_string()));
        assert_eq!(session.parse_command("0"), SessionCommand::Ask("0".to_string()));
    }
}
