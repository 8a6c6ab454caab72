use std::sync::Arc;

use colored::Colorize;

use crate::{
    cli::{print_json, Cli, Command},
    client::{
        display_models_table, fetch_models, select_model, AnthropicClient, LanguageModel,
        OllamaClient,
    },
    pipeline::SearchPipeline,
    session::AssistantSession,
    tools::{
        config::{AppConfig, Provider, DEFAULT_MODEL},
        errors::{PipelineError, RetryConfig},
        history::HistoryManager,
        web_search::WebSearchEngine,
    },
};

pub mod api_models;
pub mod cli;
pub mod client;
pub mod pipeline;
pub mod session;
pub mod tools;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());

    if let Err(e) = run(cli).await {
        log::error!("{:#}", e);

        let message = e
            .downcast_ref::<PipelineError>()
            .map(PipelineError::user_friendly_message)
            .unwrap_or_else(|| e.to_string());
        eprintln!("{} {}", "❌".red(), message);

        std::process::exit(exit_code(&e));
    }
}

/// 1 for configuration problems the user must fix, 2 for everything else.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::Config { .. }) | Some(PipelineError::MissingApiKey) => 1,
        _ => 2,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    let mut config = AppConfig::load(&config_path)?;
    cli.apply_to(&mut config);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    log::debug!("using config {}", config_path.display());

    config.validate()?;
    let history_path = HistoryManager::path_for_config(&config_path);

    match &cli.command {
        Some(Command::Models) => return list_models(&config).await,
        Some(Command::Init { force }) => {
            if config_path.exists() && !force {
                return Err(PipelineError::config(format!(
                    "{} already exists, pass --force to overwrite",
                    config_path.display()
                ))
                .into());
            }
            config.save(&config_path)?;
            println!("{} Wrote {}", "✓".green(), config_path.display());
            return Ok(());
        }
        Some(Command::History {
            limit,
            search,
            detailed,
            export,
            clear,
        }) => {
            let mut history = HistoryManager::open(history_path);
            if *clear {
                history.clear()?;
                println!("{} History cleared", "✓".green());
            } else if let Some(path) = export {
                history.export_markdown(path)?;
                println!("{} History exported to {}", "✓".green(), path.display());
            } else {
                let entries = match search {
                    Some(needle) => history.search(needle, *limit),
                    None => history.get_recent(*limit),
                };
                HistoryManager::show_entries(&entries, *detailed);
            }
            return Ok(());
        }
        None => {}
    }

    let interactive = cli.query_text().is_none();
    let llm = build_model(&config, interactive).await?;
    let engine = WebSearchEngine::new(config.search.clone())?;
    let pipeline = SearchPipeline::new(llm, engine, cli.pipeline_options(&config));

    let history = config
        .history_enabled
        .then(|| HistoryManager::open(history_path));

    match cli.query_text() {
        Some(query) if cli.json => {
            let outcome = pipeline.process_query(&query).await;
            if let Some(mut history) = history {
                if let Err(e) = history.record(&outcome) {
                    log::warn!("could not save history: {}", e);
                }
            }
            print_json(&outcome)
        }
        Some(query) => {
            AssistantSession::new(pipeline, history).ask(&query).await;
            Ok(())
        }
        None => AssistantSession::new(pipeline, history).run().await,
    }
}

async fn build_model(
    config: &AppConfig,
    interactive: bool,
) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider {
        Provider::Anthropic => {
            let api_key = config.resolve_api_key()?;
            let client = AnthropicClient::new(&config.anthropic_base_url, api_key, &config.model)?
                .with_retry(RetryConfig {
                    max_retries: config.search.retry_attempts,
                    ..RetryConfig::default()
                });
            Ok(Arc::new(client))
        }
        Provider::Ollama => {
            let model = ollama_model(config, interactive).await?;
            Ok(Arc::new(OllamaClient::new(&config.ollama_base_url, &model)?))
        }
    }
}

/// The default model name is an Anthropic one. Unless the user named a model,
/// pick one of the installed Ollama models: interactively in a session,
/// otherwise the first one listed.
async fn ollama_model(config: &AppConfig, interactive: bool) -> anyhow::Result<String> {
    if config.model != DEFAULT_MODEL {
        return Ok(config.model.clone());
    }

    let models = fetch_models(&config.ollama_base_url).await.map_err(|e| {
        println!("{} Make sure Ollama is running: ollama serve", "💡".yellow());
        e
    })?;

    match models.first() {
        None => Err(PipelineError::config(
            "no Ollama models installed; run `ollama pull llama3` or pass --model",
        )
        .into()),
        Some(_) if interactive => {
            let selected = select_model(&models)?;
            selected.display_info();
            Ok(selected.name)
        }
        Some(first) => {
            log::info!("no model given, using Ollama model {}", first.name);
            Ok(first.name.clone())
        }
    }
}

async fn list_models(config: &AppConfig) -> anyhow::Result<()> {
    let models = fetch_models(&config.ollama_base_url).await?;
    if models.is_empty() {
        println!(
            "{} No models available. Install one with: ollama pull llama3",
            "⚠".yellow()
        );
        return Ok(());
    }

    display_models_table(&models);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn ollama_config(server: &MockServer, model: &str) -> AppConfig {
        AppConfig {
            provider: Provider::Ollama,
            model: model.to_string(),
            ollama_base_url: server.base_url(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn configuration_errors_exit_with_one() {
        let config: anyhow::Error = PipelineError::config("bad").into();
        let missing_key: anyhow::Error = PipelineError::MissingApiKey.into();

        assert_eq!(exit_code(&config), 1);
        assert_eq!(exit_code(&missing_key), 1);
    }

    #[test]
    fn runtime_errors_exit_with_two() {
        let search: anyhow::Error = PipelineError::Search {
            query: "q".into(),
            message: "offline".into(),
        }
        .into();
        let io: anyhow::Error = PipelineError::Io {
            message: "denied".into(),
            path: Some(PathBuf::from("/tmp/history.json")),
        }
        .into();
        let other = anyhow::anyhow!("dialog closed");

        assert_eq!(exit_code(&search), 2);
        assert_eq!(exit_code(&io), 2);
        assert_eq!(exit_code(&other), 2);
    }

    #[tokio::test]
    async fn one_shot_ollama_query_uses_first_installed_model() {
        let server = MockServer::start_async().await;
        let tags = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({"models": [
                    {"name": "llama3:8b", "size": 4700000000u64, "digest": "abc", "modified_at": "2024-05-01T10:00:00Z"},
                    {"name": "mistral:7b", "size": 4100000000u64, "digest": "def", "modified_at": "2024-04-01T10:00:00Z"}
                ]}));
            })
            .await;

        let model = ollama_model(&ollama_config(&server, DEFAULT_MODEL), false).await.unwrap();

        assert_eq!(model, "llama3:8b");
        tags.assert_async().await;
    }

    #[tokio::test]
    async fn explicit_ollama_model_skips_the_lookup() {
        let server = MockServer::start_async().await;
        let tags = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({"models": []}));
            })
            .await;

        let model = ollama_model(&ollama_config(&server, "phi3"), false).await.unwrap();

        assert_eq!(model, "phi3");
        tags.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn no_installed_ollama_models_is_a_config_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({"models": []}));
            })
            .await;

        let error = ollama_model(&ollama_config(&server, DEFAULT_MODEL), false)
            .await
            .unwrap_err();

        assert_eq!(exit_code(&error), 1);
    }
}
