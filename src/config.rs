//! Configuration for causeway paths and remotes.
//!
//! Sources, highest priority first:
//! 1. Environment variables (CAUSEWAY_HOME, CAUSEWAY_ARTIFACTS)
//! 2. Config file (.causeway/config.yaml)
//! 3. Defaults (~/.causeway)
//!
//! The config file is found by walking up from the working directory until
//! a `.causeway/config.yaml` exists.
//! - `paths.home` is relative to the .causeway/ directory
//! - `paths.artifacts` and remote paths are relative to the project root

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::RemoteRepo;
use crate::domain::RemoteLocator;
use crate::store::FileStore;

/// Loaded once per process; a load error is cached as its message
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// `.causeway/config.yaml` as written on disk
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    #[serde(default)]
    pub resolver: Option<ResolverConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .causeway/)
    pub home: Option<String>,
    /// Artifact root of the home repository (relative to project root)
    pub artifacts: Option<String>,
}

/// A remote repository whose artifacts are checked out locally
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Repository coordinate, e.g. "acme/payments"
    pub repo: String,
    /// Artifact root of the checkout (relative to project root)
    pub path: String,
    pub track: Option<String>,
    pub pinned: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Per-remote lookup deadline
    pub deadline_ms: Option<u64>,
}

/// A remote with its path resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRemote {
    pub locator: RemoteLocator,
    pub root: PathBuf,
}

/// Configuration after env overrides and path resolution
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to causeway home (engine state)
    pub home: PathBuf,
    /// Absolute path to the home artifact root
    pub artifacts: PathBuf,
    /// Remotes in lookup order
    pub remotes: Vec<ResolvedRemote>,
    /// Deadline for each remote lookup (none = wait indefinitely)
    pub deadline: Option<Duration>,
    /// The file this came from, if any
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Path of the work pool journal
    pub fn pool_path(&self) -> PathBuf {
        self.home.join("work_pool.jsonl")
    }

    /// File-backed stores for every configured remote, in lookup order
    pub fn remote_repos(&self) -> Vec<RemoteRepo> {
        self.remotes
            .iter()
            .map(|remote| {
                let store = FileStore::new(remote.locator.repo.clone(), remote.root.clone());
                RemoteRepo::new(remote.locator.clone(), Arc::new(store))
            })
            .collect()
    }
}

/// Nearest `.causeway/config.yaml` at or above the working directory
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".causeway").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Read and parse one config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Absolute paths pass through; relative ones are joined onto `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Build a resolved config from a parsed file located at `config_path`
fn resolve_file(config: ConfigFile, config_path: &Path, default_home: PathBuf) -> ResolvedConfig {
    let causeway_dir = config_path.parent().unwrap_or(Path::new("."));
    // Project root is the parent of .causeway/
    let base_dir = causeway_dir.parent().unwrap_or(Path::new("."));

    let home = if let Ok(env_home) = std::env::var("CAUSEWAY_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        resolve_path(causeway_dir, home_path)
    } else {
        default_home
    };

    let artifacts = if let Ok(env_artifacts) = std::env::var("CAUSEWAY_ARTIFACTS") {
        PathBuf::from(env_artifacts)
    } else if let Some(ref artifacts_path) = config.paths.artifacts {
        resolve_path(base_dir, artifacts_path)
    } else {
        home.join("artifacts")
    };

    let remotes = config
        .remotes
        .into_iter()
        .map(|remote| ResolvedRemote {
            root: resolve_path(base_dir, &remote.path),
            locator: RemoteLocator {
                repo: remote.repo,
                track: remote.track,
                pinned: remote.pinned,
            },
        })
        .collect();

    let deadline = config
        .resolver
        .and_then(|r| r.deadline_ms)
        .map(Duration::from_millis);

    ResolvedConfig {
        home,
        artifacts,
        remotes,
        deadline,
        config_file: Some(config_path.to_path_buf()),
    }
}

/// Resolve configuration from env, config file and defaults
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".causeway");

    if let Some(config_path) = find_config_file() {
        let config = load_config_file(&config_path)?;
        return Ok(resolve_file(config, &config_path, default_home));
    }

    // Env vars or defaults only
    let home = std::env::var("CAUSEWAY_HOME")
        .map(PathBuf::from)
        .unwrap_or(default_home);

    let artifacts = std::env::var("CAUSEWAY_ARTIFACTS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join("artifacts"));

    Ok(ResolvedConfig {
        home,
        artifacts,
        remotes: Vec::new(),
        deadline: None,
        config_file: None,
    })
}

/// The process-wide configuration
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Resolve configuration again, bypassing the cache
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the causeway home directory (engine state).
pub fn causeway_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the home artifact root.
pub fn artifacts_dir() -> Result<PathBuf> {
    Ok(config()?.artifacts.clone())
}

/// Get the work pool journal path ($CAUSEWAY_HOME/work_pool.jsonl)
pub fn pool_path() -> Result<PathBuf> {
    Ok(config()?.pool_path())
}
