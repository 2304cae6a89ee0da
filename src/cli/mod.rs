//! Command-line interface for causeway.
//!
//! Provides commands for injecting artifacts, inspecting the causal graph,
//! and driving work units through their lifecycle.
//!
//! Exit codes: 0 on success, 2 when injection is rejected by validation,
//! 3 when the artifact already has a live work unit, 1 for everything else.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::config;
use crate::core::{CoreError, ListingEntry, Orchestrator};
use crate::domain::{Artifact, ArtifactKind, WorkUnit};
use crate::pool::JournalPool;
use crate::store::FileStore;

/// Exit code when validation rejects an injection
pub const EXIT_REJECTED: i32 = 2;

/// Exit code when the artifact already has a live work unit
pub const EXIT_ALREADY_INJECTED: i32 = 3;

/// causeway - Causal artifact graph and work injection
#[derive(Parser, Debug)]
#[command(name = "causeway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate an artifact and enqueue a work unit for it
    Inject {
        /// Artifact ID
        artifact_id: String,

        /// Artifact kind
        #[arg(short, long, default_value = "chunk")]
        kind: ArtifactKind,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Run injection checks without enqueueing
    Validate {
        /// Artifact ID
        artifact_id: String,

        /// Artifact kind
        #[arg(short, long, default_value = "chunk")]
        kind: ArtifactKind,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// List artifacts newest first
    List {
        /// Artifact kind
        #[arg(default_value = "chunk")]
        kind: ArtifactKind,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Show the current tips (artifacts nothing was created after)
    Tips {
        /// Artifact kind
        #[arg(default_value = "chunk")]
        kind: ArtifactKind,

        /// Only consider artifacts in subsystems matching this glob
        #[arg(short, long)]
        subsystem: Option<String>,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Show the newest artifact
    Latest {
        /// Artifact kind
        #[arg(default_value = "chunk")]
        kind: ArtifactKind,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// List work units
    Units {
        /// Only show units for this artifact
        #[arg(short, long)]
        artifact: Option<String>,

        /// Kind of the artifact filter
        #[arg(short, long, default_value = "chunk")]
        kind: ArtifactKind,

        /// Print machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Mark a queued work unit as dispatched
    Dispatch {
        /// Work unit ID (UUID)
        unit_id: String,

        /// Agent taking the unit
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Mark a dispatched work unit as completed
    Complete {
        /// Work unit ID (UUID)
        unit_id: String,
    },

    /// Mark a dispatched work unit as failed
    Fail {
        /// Work unit ID (UUID)
        unit_id: String,

        /// Why the unit failed
        #[arg(short, long)]
        reason: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Inject {
                artifact_id,
                kind,
                json,
            } => inject(kind, &artifact_id, json).await,
            Commands::Validate {
                artifact_id,
                kind,
                json,
            } => validate(kind, &artifact_id, json).await,
            Commands::List { kind, json } => list(kind, json).await,
            Commands::Tips {
                kind,
                subsystem,
                json,
            } => tips(kind, subsystem.as_deref(), json).await,
            Commands::Latest { kind, json } => latest(kind, json).await,
            Commands::Units {
                artifact,
                kind,
                json,
            } => units(artifact.as_deref(), kind, json).await,
            Commands::Dispatch { unit_id, agent } => {
                let unit_id = parse_unit_id(&unit_id)?;
                let unit = build_orchestrator().await?.dispatch(unit_id, agent).await?;
                print_transition(&unit);
                Ok(())
            }
            Commands::Complete { unit_id } => {
                let unit_id = parse_unit_id(&unit_id)?;
                let unit = build_orchestrator().await?.complete(unit_id).await?;
                print_transition(&unit);
                Ok(())
            }
            Commands::Fail { unit_id, reason } => {
                let unit_id = parse_unit_id(&unit_id)?;
                let unit = build_orchestrator().await?.fail(unit_id, reason).await?;
                print_transition(&unit);
                Ok(())
            }
            Commands::Config => show_config().await,
        }
    }
}

/// Wire the orchestrator from the resolved configuration
async fn build_orchestrator() -> Result<Orchestrator> {
    let cfg = config::config()?;

    let home = Arc::new(FileStore::new("home", cfg.artifacts.clone()));
    let pool = JournalPool::open_default()
        .await
        .context("Failed to open work pool")?;

    Ok(Orchestrator::new(home.clone(), home, Arc::new(pool))
        .with_remotes(cfg.remote_repos())
        .with_deadline(cfg.deadline))
}

fn parse_unit_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid work unit ID: {}", s))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Inject an artifact
async fn inject(kind: ArtifactKind, artifact_id: &str, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator().await?;

    match orchestrator.inject(kind, artifact_id).await {
        Ok(unit_id) => {
            if json {
                print_json(&serde_json::json!({ "unit_id": unit_id }))?;
            } else {
                println!("{}", unit_id);
                eprintln!("[{} {} queued as {}]", kind, artifact_id, unit_id);
            }
            Ok(())
        }
        Err(CoreError::ValidationRejected { id, issues }) => {
            if json {
                print_json(&serde_json::json!({ "rejected": id, "issues": issues }))?;
            } else {
                eprintln!("Cannot inject {} '{}':", kind, id);
                for issue in &issues {
                    eprintln!("  {}", issue);
                }
            }
            std::process::exit(EXIT_REJECTED);
        }
        Err(CoreError::AlreadyInjected {
            artifact_id,
            unit_id,
        }) => {
            if json {
                print_json(&serde_json::json!({
                    "already_injected": artifact_id,
                    "unit_id": unit_id,
                }))?;
            } else {
                eprintln!(
                    "'{}' already has live work unit {} (see `causeway units --artifact {}`)",
                    artifact_id, unit_id, artifact_id
                );
            }
            std::process::exit(EXIT_ALREADY_INJECTED);
        }
        Err(e) => Err(e.into()),
    }
}

/// Print validation issues without enqueueing
async fn validate(kind: ArtifactKind, artifact_id: &str, json: bool) -> Result<()> {
    let issues = build_orchestrator()
        .await?
        .validate(kind, artifact_id)
        .await?;

    if json {
        print_json(&issues)?;
    } else if issues.is_empty() {
        println!("{} '{}' is injectable", kind, artifact_id);
    } else {
        for issue in &issues {
            println!("{}", issue);
        }
    }

    if !issues.is_empty() {
        std::process::exit(EXIT_REJECTED);
    }
    Ok(())
}

/// List artifacts newest first
async fn list(kind: ArtifactKind, json: bool) -> Result<()> {
    let listing = build_orchestrator().await?.index().listing(kind).await?;

    if json {
        return print_json(&listing);
    }

    if listing.entries.is_empty() {
        println!("No {} found", kind.plural());
        return Ok(());
    }

    println!("{:<32} {:<14} {}", "ID", "STATUS", "SOURCE");
    println!("{}", "-".repeat(75));

    for entry in &listing.entries {
        match entry {
            ListingEntry::Artifact(artifact) => print_artifact_row(artifact),
            ListingEntry::Unresolvable(unresolved) => {
                let origin = unresolved
                    .locator
                    .as_ref()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "{:<32} {:<14} [UNRESOLVABLE] {} ({})",
                    unresolved.id, "?", origin, unresolved.reason
                );
            }
        }
    }

    Ok(())
}

fn print_artifact_row(artifact: &Artifact) {
    let source = match artifact.remote_locator() {
        Some(locator) => format!("[EXTERNAL] {}", locator),
        None => "local".to_string(),
    };
    println!("{:<32} {:<14} {}", artifact.id, artifact.status.as_str(), source);
}

/// Show tips, optionally filtered by subsystem
async fn tips(kind: ArtifactKind, subsystem: Option<&str>, json: bool) -> Result<()> {
    let index = build_orchestrator().await?.index();
    let tips = match subsystem {
        Some(pattern) => index.tips_for(kind, pattern).await?,
        None => index.tips(kind).await?,
    };

    if json {
        return print_json(&tips);
    }

    if tips.is_empty() {
        println!("No {} tips", kind);
        return Ok(());
    }

    for artifact in &tips {
        print_artifact_row(artifact);
    }
    Ok(())
}

/// Show the newest artifact
async fn latest(kind: ArtifactKind, json: bool) -> Result<()> {
    let artifact = build_orchestrator().await?.index().latest(kind).await?;

    if json {
        return print_json(&artifact);
    }
    print_artifact_row(&artifact);
    Ok(())
}

/// List work units
async fn units(artifact: Option<&str>, kind: ArtifactKind, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator().await?;
    let units = match artifact {
        Some(id) => orchestrator.history(kind, id).await?,
        None => orchestrator.units().await?,
    };

    if json {
        return print_json(&units);
    }

    if units.is_empty() {
        println!("No work units found");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:<12} {:<8} {}",
        "UNIT ID", "ARTIFACT", "STATE", "ATTEMPT", "AGENT"
    );
    println!("{}", "-".repeat(100));

    for unit in units {
        let artifact = if unit.external {
            format!("{} [EXTERNAL]", unit.artifact_id)
        } else {
            unit.artifact_id.clone()
        };
        println!(
            "{:<38} {:<28} {:<12} {:<8} {}",
            unit.id,
            artifact,
            unit.state.to_string(),
            unit.attempt,
            unit.assigned_agent.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

fn print_transition(unit: &WorkUnit) {
    println!("{} {} ({})", unit.id, unit.state, unit.artifact_id);
    if let Some(ref error) = unit.error {
        println!("  error: {}", error);
    }
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("causeway configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Artifacts:           {}", cfg.artifacts.display());
    println!("  Work pool:           {}", cfg.pool_path().display());
    println!();
    println!("Remotes:");
    if cfg.remotes.is_empty() {
        println!("  (none)");
    } else {
        for remote in &cfg.remotes {
            println!("  {:<30} {}", remote.locator.to_string(), remote.root.display());
        }
    }
    println!();
    match cfg.deadline {
        Some(deadline) => println!("Resolver deadline: {}ms", deadline.as_millis()),
        None => println!("Resolver deadline: (none)"),
    }

    Ok(())
}
