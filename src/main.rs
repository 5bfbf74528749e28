//! csm-flow - review-retry workflow for client service manager lists

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use csm_flow::config::{ConfigLevel, ConfigLoader};
use csm_flow::flow::{plot, GenerationStep, PlotFormat, ReviewStep, WorkflowDriver};
use csm_flow::{
    create_llm_client, ConsoleNotifier, ExitReport, FileSink, FlowConfig, FlowOutcome,
    IntoFlowError, ResearcherCrew, ReviewCrew, RunLog,
};

#[derive(Parser)]
#[command(name = "csm-flow")]
#[command(version)]
#[command(about = "Research, review, and save client service manager lists", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the settings file.
#[derive(Args, Debug, Clone)]
struct FlowArgs {
    /// Client to research
    #[arg(short, long, env = "CSM_CLIENT")]
    client: Option<String>,

    /// LLM model (e.g. gpt-4o-mini, gpt-4o, sonnet, opus)
    #[arg(short, long, env = "CSM_MODEL")]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the research/review loop until accepted or out of retries
    Run {
        #[command(flatten)]
        args: FlowArgs,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the researcher once and print the draft
    Research {
        #[command(flatten)]
        args: FlowArgs,

        /// Reviewer feedback to address
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Run the reviewer once on an existing list
    Review {
        #[command(flatten)]
        args: FlowArgs,

        /// File containing the list to review
        #[arg(short, long)]
        input: PathBuf,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render the workflow graph
    Plot {
        /// Output format: mermaid or text
        #[arg(short, long, default_value = "mermaid")]
        format: PlotFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent runs from the run log
    History {
        /// Show last N runs
        #[arg(short, long, default_value = "5")]
        last: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Delete the run log
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the merged configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration files
    Validate,

    /// Show configuration file paths
    Paths,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "csm_flow=debug,info"
    } else {
        "csm_flow=info,warn"
    };

    // Logs go to stderr so stdout carries only artifacts and reports.
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = dispatch(cli.command, &project_path).await {
        let report = ExitReport::from_error(&e);
        if let Some(message) = report.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        if let Some(hint) = report.hint {
            eprintln!("{} {}", "Hint:".yellow().bold(), hint);
        }
        std::process::exit(report.code);
    }

    Ok(())
}

async fn dispatch(command: Commands, project_path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run { args, json } => {
            let config = load_config(project_path, args)?;
            let client = config.require_client()?.to_string();
            let driver = build_driver(&config, project_path)?;

            println!(
                "{} Generating the CSM list for {} (max retries: {})",
                "Flow:".cyan().bold(),
                client,
                config.max_retries
            );

            let outcome = driver.run(&client).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if let FlowOutcome::Accepted { cycles, .. } = &outcome {
                println!(
                    "{} CSM list accepted after {} cycle(s), saved to {}",
                    "OK".green().bold(),
                    cycles,
                    config.output_path(project_path).display()
                );
            }

            outcome.into_result(config.max_retries)?;
        }

        Commands::Research { args, feedback } => {
            let config = load_config(project_path, args)?;
            let client = config.require_client()?.to_string();
            let llm = create_llm_client(&config.llm, project_path).into_flow_config()?;

            let step = GenerationStep::new(Arc::new(ResearcherCrew::new(llm)));
            let artifact = step.generate(&client, feedback.as_deref()).await?;
            println!("{}", artifact);
        }

        Commands::Review { args, input, json } => {
            let config = load_config(project_path, args)?;
            let client = config.require_client()?.to_string();
            let artifact = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let llm = create_llm_client(&config.llm, project_path).into_flow_config()?;

            let step = ReviewStep::new(Arc::new(ReviewCrew::new(llm)));
            let outcome = step.review(&artifact, &client).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.valid {
                println!("{} Review accepted the list", "OK".green().bold());
            } else {
                println!(
                    "{} Review rejected the list: {}",
                    "Rejected:".yellow().bold(),
                    outcome.feedback.as_deref().unwrap_or("(no feedback)")
                );
            }
        }

        Commands::Plot { format, output } => {
            let rendered = plot::render(format);
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} Plot written to {}", "OK".green().bold(), path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = FlowConfig::load(project_path)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("\n{} Flow Configuration", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!(
                        "   Client: {}",
                        config.client.as_deref().unwrap_or("(not set)")
                    );
                    println!("   Max retries: {}", config.max_retries);
                    println!("   Output: {}", config.output_path(project_path).display());
                    println!("   Run log: {}", config.run_log);
                    println!("   Provider: {}", config.llm.provider);
                    println!("   Model: {}", config.llm.effective_model());
                    println!("   Temperature: {}", config.llm.temperature);
                    println!("   Max tokens: {}", config.llm.max_tokens);
                    println!("   Max attempts: {}", config.llm.max_attempts);
                }
            }

            ConfigAction::Validate => {
                let (config, chain) = ConfigLoader::new().load_with_chain(project_path)?;
                debug!("{}", chain.describe());

                if chain.loaded_count() == 0 {
                    println!("{} No settings files found (using defaults)", "Info:".blue());
                }
                config.validate()?;
                println!("{} Configuration is valid", "OK".green());
            }

            ConfigAction::Paths => {
                let loader = ConfigLoader::new();
                println!("\n{} Configuration Paths", "Config:".cyan().bold());
                println!("{}", "─".repeat(40));
                println!(
                    "   Settings [{}]: {}",
                    ConfigLevel::User,
                    loader
                        .user_config_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(unavailable)".to_string())
                );
                println!(
                    "   Settings [{}]: {}",
                    ConfigLevel::Project,
                    FlowConfig::settings_path(project_path).display()
                );
                println!("   Run log: {}", RunLog::path_for(project_path).display());
            }
        },

        Commands::History { last, json, clear } => {
            let run_log = RunLog::new(project_path);

            if clear {
                run_log.clear()?;
                println!("{} Run log cleared", "OK".green().bold());
                return Ok(());
            }

            let runs = run_log.recent_runs(last)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                run_log.print_summary(&runs);
            }
        }
    }

    Ok(())
}

/// Load settings, apply CLI overrides, and validate.
fn load_config(project_path: &Path, args: FlowArgs) -> csm_flow::Result<FlowConfig> {
    let mut config = FlowConfig::load(project_path)?;
    config.apply_overrides(args.client, args.model);
    config.validate()?;
    Ok(config)
}

fn build_driver(config: &FlowConfig, project_path: &Path) -> csm_flow::Result<WorkflowDriver> {
    let llm = create_llm_client(&config.llm, project_path).into_flow_config()?;
    debug!("Using model {}", llm.model_name());

    let driver = WorkflowDriver::new(
        GenerationStep::new(Arc::new(ResearcherCrew::new(llm.clone()))),
        ReviewStep::new(Arc::new(ReviewCrew::new(llm))),
        Arc::new(FileSink::new(config.output_path(project_path))),
        Arc::new(ConsoleNotifier::new()),
    )
    .with_max_retries(config.max_retries);

    Ok(if config.run_log {
        driver.with_run_log(RunLog::new(project_path))
    } else {
        driver
    })
}
