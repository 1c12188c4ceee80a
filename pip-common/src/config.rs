//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. A missing file is created
//! with compiled defaults; an unreadable one is never fatal and the defaults
//! are used instead.
//!
//! # Root folder priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PIP_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PIP_ROOT_FOLDER";

/// Environment variable pointing at an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "PIP_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "pip.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database and reference tables
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tables: TablesConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Reference table locations
///
/// Relative paths are resolved against the root folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TablesConfig {
    /// Citation-count distribution keyed by paper age
    #[serde(default = "default_citation_table")]
    pub citations: PathBuf,

    /// Paper-count distribution keyed by years since first publication
    #[serde(default = "default_productivity_table")]
    pub productivity: PathBuf,

    /// Distribution of PiP-AUC scores across authors
    #[serde(default = "default_pip_auc_table")]
    pub pip_auc: PathBuf,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            citations: default_citation_table(),
            productivity: default_productivity_table(),
            pip_auc: default_pip_auc_table(),
        }
    }
}

impl TablesConfig {
    /// Resolve a table path against the root folder
    pub fn resolve(&self, root: &Path, table: &Path) -> PathBuf {
        if table.is_absolute() {
            table.to_path_buf()
        } else {
            root.join(table)
        }
    }
}

/// Refresh queue settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Queue receiving author refresh tasks
    #[serde(default = "default_authors_queue")]
    pub authors_queue: String,

    /// Queue receiving publication refresh tasks
    #[serde(default = "default_publications_queue")]
    pub publications_queue: String,

    /// Region pool that scrape-triggering calls rotate through
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    /// Author fetch endpoint; `{region}` is substituted
    #[serde(default = "default_author_endpoint")]
    pub author_endpoint: String,

    /// Publication fetch endpoint; `{region}` is substituted
    #[serde(default = "default_publication_endpoint")]
    pub publication_endpoint: String,

    /// How many candidate ids to over-fetch per requested coauthor
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// Request timeout for source fetches, in seconds
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,

    /// Maximum source fetches per second
    #[serde(default = "default_source_rate_per_sec")]
    pub source_rate_per_sec: u32,

    /// Fixed origin of the hourly region buckets
    #[serde(default = "default_region_epoch")]
    pub region_epoch: DateTime<Utc>,

    /// Stored authors whose coauthor lists are scanned per candidate request
    #[serde(default = "default_candidate_scan_limit")]
    pub candidate_scan_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            authors_queue: default_authors_queue(),
            publications_queue: default_publications_queue(),
            regions: default_regions(),
            author_endpoint: default_author_endpoint(),
            publication_endpoint: default_publication_endpoint(),
            oversample_factor: default_oversample_factor(),
            source_timeout_secs: default_source_timeout_secs(),
            source_rate_per_sec: default_source_rate_per_sec(),
            region_epoch: default_region_epoch(),
            candidate_scan_limit: default_candidate_scan_limit(),
        }
    }
}

/// Document store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Largest serialized document the store accepts, in bytes
    #[serde(default = "default_document_ceiling")]
    pub document_ceiling_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            document_ceiling_bytes: default_document_ceiling(),
        }
    }
}

/// Scoring settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    /// Paper ages are clamped to `1..=max_age`
    #[serde(default = "default_max_age")]
    pub max_age: u32,

    /// Publications older than this year are ignored
    #[serde(default = "default_min_publication_year")]
    pub min_publication_year: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            min_publication_year: default_min_publication_year(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_citation_table() -> PathBuf {
    PathBuf::from("data/percentiles.csv")
}

fn default_productivity_table() -> PathBuf {
    PathBuf::from("data/author_numpapers_percentiles.csv")
}

fn default_pip_auc_table() -> PathBuf {
    PathBuf::from("data/pip_auc_percentiles.csv")
}

fn default_authors_queue() -> String {
    "process-authors".to_string()
}

fn default_publications_queue() -> String {
    "process-pubs".to_string()
}

fn default_regions() -> Vec<String> {
    vec![
        "northamerica-northeast1".to_string(),
        "northamerica-northeast2".to_string(),
        "us-east5".to_string(),
    ]
}

fn default_author_endpoint() -> String {
    "https://{region}.scholar-pip.invalid/search_author_id".to_string()
}

fn default_publication_endpoint() -> String {
    "https://{region}.scholar-pip.invalid/fill_publication".to_string()
}

fn default_oversample_factor() -> usize {
    100
}

fn default_source_timeout_secs() -> u64 {
    30
}

fn default_source_rate_per_sec() -> u32 {
    1
}

fn default_region_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

fn default_candidate_scan_limit() -> usize {
    200
}

fn default_document_ceiling() -> usize {
    500_000
}

fn default_max_age() -> u32 {
    40
}

fn default_min_publication_year() -> i32 {
    1950
}

fn default_bind() -> String {
    "127.0.0.1:5780".to_string()
}

/// How the effective configuration was obtained
#[derive(Debug)]
pub enum ConfigOrigin {
    /// Read from the file
    Loaded,
    /// No file existed; compiled defaults were written to it
    Created,
    /// The file could not be read, parsed or written; compiled defaults apply
    Defaults(Error),
}

/// Load a TOML config file, writing compiled defaults there on first run
///
/// Never fails: an unusable file yields the defaults and the reason. Runs
/// before logging is set up, so reporting the origin is left to the caller.
pub fn load_or_create_toml_config(path: &Path) -> (TomlConfig, ConfigOrigin) {
    if !path.exists() {
        let config = TomlConfig::default();
        return match write_toml_config(&config, path) {
            Ok(()) => (config, ConfigOrigin::Created),
            Err(e) => (config, ConfigOrigin::Defaults(e)),
        };
    }

    match try_load_toml_config(path) {
        Ok(config) => (config, ConfigOrigin::Loaded),
        Err(e) => (TomlConfig::default(), ConfigOrigin::Defaults(e)),
    }
}

/// Load a TOML config file, reporting why it could not be used
pub fn try_load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp = target.with_extension("toml.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, target)?;

    debug!("Wrote configuration to {}", target.display());
    Ok(())
}

/// Default config file location for the platform (`<config dir>/pip/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("pip").join("config.toml"))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: toml.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pip"))
        .unwrap_or_else(|| PathBuf::from("./pip_data"))
}

/// Prepares the root folder on disk
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }
}
