use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::converter::ConverterConfig;
use crate::retention::RetentionConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted upload size in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> u64 {
    512
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("convertifile.db")
}

/// Filesystem layout for spooled inputs and result artifacts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory result artifacts are stored in.
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,

    /// Directory uploads are spooled to before conversion.
    #[serde(default = "default_intake_dir")]
    pub intake_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            result_dir: default_result_dir(),
            intake_dir: default_intake_dir(),
        }
    }
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("data/results")
}

fn default_intake_dir() -> PathBuf {
    PathBuf::from("data/intake")
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    /// Number of concurrent conversion workers.
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}
