use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::capture::{LoopSettings, Rotation};

pub const DEFAULT_SERVE_PORT: u16 = 5000;
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_IDLE_DELAY_MILLIS: u64 = 1000;
const DEFAULT_DATABASE_FILE: &str = "camrecord.sqlite3";

/// Command line of the recorder process.
#[derive(Debug, Parser)]
#[command(name = "camrecord", version, about = "Records images from a networked camera")]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Prepare storage and the image table, then exit without capturing
    #[arg(long)]
    pub dry_run: bool,

    /// Drop and recreate the image table on start
    #[arg(long)]
    pub reset_database: bool,
}

fn default_serve_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_serve_port() -> u16 {
    DEFAULT_SERVE_PORT
}

fn default_capture_timeout_secs() -> u64 {
    DEFAULT_CAPTURE_TIMEOUT_SECS
}

fn default_idle_delay_millis() -> u64 {
    DEFAULT_IDLE_DELAY_MILLIS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    /// Image endpoint. `{}` and `{0}` are replaced with the capture identity.
    pub capture_url: String,
    pub status_url: String,
    pub image_storage_path: PathBuf,
    #[serde(default)]
    pub record_rotate: Option<Rotation>,
    #[serde(default = "default_serve_address")]
    pub serve_address: IpAddr,
    #[serde(default = "default_serve_port")]
    pub serve_port: u16,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
    #[serde(default = "default_idle_delay_millis")]
    pub idle_delay_millis: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub reset_database: bool,
}

impl RecorderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named on the command line and applies the flag
    /// overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = Self::load(&cli.config)?;
        config.dry_run |= cli.dry_run;
        config.reset_database |= cli.reset_database;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture_url.trim().is_empty() {
            bail!("capture_url must not be empty");
        }
        if self.status_url.trim().is_empty() {
            bail!("status_url must not be empty");
        }
        if self.image_storage_path.as_os_str().is_empty() {
            bail!("image_storage_path must not be empty");
        }
        if self.capture_timeout_secs == 0 {
            bail!("capture_timeout_secs must be positive");
        }
        if self.idle_delay_millis == 0 {
            bail!("idle_delay_millis must be positive");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.image_storage_path.join(DEFAULT_DATABASE_FILE))
    }

    pub fn serve_addr(&self) -> SocketAddr {
        SocketAddr::new(self.serve_address, self.serve_port)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            storage_dir: self.image_storage_path.clone(),
            rotation: self.record_rotate,
            reset_database: self.reset_database,
            dry_run: self.dry_run,
            idle_delay: Duration::from_millis(self.idle_delay_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "capture_url": "http://cam.local/capture?_cb={}",
        "status_url": "http://cam.local/status",
        "image_storage_path": "/var/lib/camrecord"
    }"#;

    #[test]
    fn defaults_fill_optional_keys() {
        let config = RecorderConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.serve_addr(), "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/camrecord/camrecord.sqlite3")
        );
        assert_eq!(config.capture_timeout(), Duration::from_secs(60));
        assert_eq!(config.record_rotate, None);

        let settings = config.loop_settings();
        assert_eq!(settings.idle_delay, Duration::from_secs(1));
        assert!(!settings.dry_run);
        assert!(!settings.reset_database);
    }

    #[test]
    fn rotation_is_parsed_from_degrees() {
        let json = MINIMAL.replace(
            "\"image_storage_path\"",
            "\"record_rotate\": 270, \"image_storage_path\"",
        );
        let config = RecorderConfig::from_json(&json).unwrap();
        assert_eq!(config.record_rotate.map(Rotation::degrees), Some(270));

        let tilted = MINIMAL.replace(
            "\"image_storage_path\"",
            "\"record_rotate\": 45, \"image_storage_path\"",
        );
        let config = RecorderConfig::from_json(&tilted).unwrap();
        assert_eq!(config.loop_settings().rotation, Some(Rotation::from_degrees(45)));
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let fractional_rotation = MINIMAL.replace(
            "\"image_storage_path\"",
            "\"record_rotate\": 12.5, \"image_storage_path\"",
        );
        let empty_url = MINIMAL.replace("http://cam.local/status", " ");
        let zero_timeout = MINIMAL.replace(
            "\"image_storage_path\"",
            "\"capture_timeout_secs\": 0, \"image_storage_path\"",
        );
        let missing_key = r#"{"capture_url": "http://cam.local/capture"}"#;
        let typo = MINIMAL.replace("status_url", "status_uri");

        for json in [
            fractional_rotation.as_str(),
            empty_url.as_str(),
            zero_timeout.as_str(),
            missing_key,
            typo.as_str(),
        ] {
            assert!(RecorderConfig::from_json(json).is_err(), "{json}");
        }
    }

    #[test]
    fn command_line_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, MINIMAL).unwrap();

        let cli = Cli::parse_from([
            "camrecord",
            "--config",
            path.to_str().unwrap(),
            "--reset-database",
        ]);
        let config = RecorderConfig::from_cli(&cli).unwrap();
        assert!(config.reset_database);
        assert!(!config.dry_run);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecorderConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read configuration"));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["camrecord"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(!cli.dry_run && !cli.reset_database);
    }
}
