use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use innovation_flow_lib::config::{merge_overrides, store_api_keys, ConfigManager, SecretsConfig};
use innovation_flow_lib::workflow::COMPLETION_TOKEN;
use innovation_flow_lib::{build_session_manager, Clarification, LoopStatus, WorkflowError};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Innovation Flow - competency discovery, idea generation and action plans
#[derive(Parser, Debug)]
#[command(name = "innovation-flow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.innovation-flow/config.yaml)
    #[arg(long, global = true, env = "INNOVATION_FLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an interactive session for a company
    Run {
        /// Company to research
        #[arg(long)]
        company: String,

        /// Directory for evaluation sheets, action plans and records
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Upper bound on generated ideas
        #[arg(long)]
        max_ideas: Option<usize>,

        /// Number of ideas that get an action plan
        #[arg(long)]
        top_k: Option<usize>,

        /// Generation model override
        #[arg(long)]
        model: Option<String>,

        /// Use deterministic in-process collaborators instead of the web APIs
        #[arg(long)]
        offline: bool,
    },
    /// Write the default config file and optionally store API keys
    InitConfig {
        /// Generation API key, stored in ~/.innovation-flow/secrets.toml
        #[arg(long)]
        gemini_key: Option<String>,

        /// Search API key, stored in ~/.innovation-flow/secrets.toml
        #[arg(long)]
        tavily_key: Option<String>,
    },
}

type StdinLines = Lines<BufReader<Stdin>>;

async fn prompt_line(lines: &mut StdinLines, prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("stdin closed"))?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::new(path),
        None => ConfigManager::default_location(),
    };

    match cli.command {
        Command::InitConfig {
            gemini_key,
            tavily_key,
        } => {
            manager.initialize().map_err(|e| anyhow!(e))?;
            println!("Config written to {}", manager.path().display());

            if gemini_key.is_none() && tavily_key.is_none() {
                return Ok(());
            }
            let secrets_path = SecretsConfig::get_secrets_path()
                .ok_or_else(|| anyhow!("Could not determine home directory for the secrets file"))?;
            if store_api_keys(&secrets_path, gemini_key.as_deref(), tavily_key.as_deref())? {
                println!("API keys stored in {}", secrets_path.display());
            }
            Ok(())
        }
        Command::Run {
            company,
            artifacts_dir,
            max_ideas,
            top_k,
            model,
            offline,
        } => {
            let file_config = manager.read().map_err(|e| anyhow!(e))?;
            let config = merge_overrides(
                &file_config,
                artifacts_dir.as_deref(),
                max_ideas,
                top_k,
                model.as_deref(),
            );
            run_session(&company, &config, offline).await
        }
    }
}

async fn run_session(
    company: &str,
    config: &innovation_flow_lib::config::AppConfig,
    offline: bool,
) -> Result<()> {
    let sessions = build_session_manager(config, offline)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut round = sessions.start(company).await?;
    let session_id = round.session_id.clone();
    println!("Session {} for '{}'", session_id, company);

    while round.status == LoopStatus::Continue {
        println!("\nCompetencies so far:");
        for c in &round.competencies {
            println!("  - [{}] {} ({})", c.category, c.competency, c.technology_level);
        }
        println!(
            "\nPlease answer (empty line skips, {} ends the clarification loop):",
            COMPLETION_TOKEN
        );

        let mut answers = Vec::new();
        for question in &round.questions {
            let answer = prompt_line(&mut lines, &format!("{}\n> ", question)).await?;
            let done = innovation_flow_lib::workflow::is_completion_token(&answer);
            answers.push(Clarification::new(question.clone(), answer));
            if done {
                break;
            }
        }
        round = sessions.answer_clarifications(&session_id, answers).await?;
    }

    let ready = sessions.generate_ideas(&session_id).await?;
    println!("\n{} ideas generated:", ready.ideas.len());
    for idea in &ready.ideas {
        println!("  - {} ({})", idea.title, idea.application_area);
    }
    println!(
        "\nScore the ideas in {} and press Enter (or type another path).",
        ready.evaluation_path.display()
    );

    loop {
        let input = prompt_line(&mut lines, "> ").await?;
        let path = if input.is_empty() {
            ready.evaluation_path.clone()
        } else {
            PathBuf::from(input)
        };
        match sessions.submit_evaluation_file(&session_id, &path).await {
            Ok(evaluations) => {
                println!("{} evaluation(s) accepted", evaluations.len());
                break;
            }
            Err(e @ WorkflowError::InvalidEvaluation(_)) | Err(e @ WorkflowError::Artifact(_)) => {
                println!("{}. Fix the sheet and press Enter again.", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let completion = sessions
        .finish(&session_id)
        .await
        .context("Failed to generate action plans")?;
    println!("\nTop ideas:");
    for (i, ranked) in completion.selected.iter().enumerate() {
        println!("  {}. {} (score {:.1})", i + 1, ranked.idea.title, ranked.score);
    }
    println!("\nAction plans written to {}", completion.action_plan_path.display());
    Ok(())
}
