use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskloom::config::EngineConfig;
use taskloom::plan::{PlanValidator, TaskPlan};

#[derive(Parser)]
#[command(name = "taskloom")]
#[command(about = "Plan validation and configuration for the taskloom orchestration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a task plan JSON file
    Validate {
        /// Path to the plan file
        plan: PathBuf,
    },
    /// Inspect or initialize configuration
    Config {
        /// Show the effective configuration
        #[arg(short, long)]
        show: bool,
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    taskloom::logging::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { plan } => validate_plan(plan),
        Commands::Config { show, init } => handle_config(show, init),
    }
}

fn validate_plan(path: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;

    let result = TaskPlan::from_json(&content).and_then(|plan| {
        PlanValidator::validate(&plan)?;
        Ok(plan)
    });

    match result {
        Ok(plan) => {
            println!("✓ plan is valid: {} ({} steps)", plan.title, plan.total_steps);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

fn handle_config(show: bool, init: bool) -> Result<()> {
    if init {
        let path = EngineConfig::config_path()?;
        if path.exists() {
            println!("Configuration already exists at: {}", path.display());
        } else {
            EngineConfig::default().save()?;
            println!("Configuration saved to: {}", path.display());
        }
        return Ok(());
    }

    if show {
        let config = EngineConfig::load()?;
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("No action given. Use --show to view or --init to create the configuration.");
    Ok(())
}
