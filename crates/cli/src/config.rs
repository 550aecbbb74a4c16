//! Config and state file locations.
//!
//! Config is read from `$XDG_CONFIG_HOME/fetchkit/config.json`; the session
//! file lives in `$XDG_DATA_HOME/fetchkit/session.json`. Both can be
//! overridden from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use fetchkit::ClientConfig;

use crate::cli::Cli;
use crate::error::{CliError, Result};

const APP_DIR: &str = "fetchkit";

/// Resolved file paths for one invocation.
#[derive(Debug, Clone)]
pub struct StatePaths {
	pub config: PathBuf,
	pub session: PathBuf,
}

impl StatePaths {
	pub fn resolve(config_override: Option<&Path>, data_dir_override: Option<&Path>) -> Self {
		let config = config_override.map(Path::to_path_buf).unwrap_or_else(|| {
			dirs::config_dir()
				.unwrap_or_else(|| PathBuf::from("."))
				.join(APP_DIR)
				.join("config.json")
		});
		let data_dir = data_dir_override
			.map(Path::to_path_buf)
			.unwrap_or_else(|| dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR));

		Self {
			config,
			session: data_dir.join("session.json"),
		}
	}
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
	let content = match fs::read_to_string(path) {
		Ok(content) => content,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
			tracing::debug!(path = %path.display(), "no config file, using defaults");
			return Ok(ClientConfig::default());
		}
		Err(err) => return Err(err.into()),
	};
	serde_json::from_str(&content).map_err(|source| CliError::Config {
		path: path.to_path_buf(),
		source,
	})
}

/// Applies command-line overrides on top of the file config.
pub fn apply_overrides(mut config: ClientConfig, cli: &Cli) -> ClientConfig {
	if let Some(base_url) = &cli.base_url {
		config.base_url = base_url.clone();
	}
	if let Some(timeout_ms) = cli.timeout_ms {
		config.default_timeout_ms = timeout_ms;
	}
	config
}

#[cfg(test)]
mod tests {
	use clap::Parser;
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn overrides_replace_defaults_paths() {
		let tmp = TempDir::new().unwrap();
		let paths = StatePaths::resolve(Some(&tmp.path().join("c.json")), Some(tmp.path()));
		assert_eq!(paths.config, tmp.path().join("c.json"));
		assert_eq!(paths.session, tmp.path().join("session.json"));

		let default = StatePaths::resolve(None, None);
		assert!(default.config.ends_with("fetchkit/config.json"));
		assert!(default.session.ends_with("fetchkit/session.json"));
	}

	#[test]
	fn missing_config_uses_defaults() {
		let tmp = TempDir::new().unwrap();
		let config = load_config(&tmp.path().join("absent.json")).unwrap();
		assert_eq!(config, ClientConfig::default());
	}

	#[test]
	fn partial_config_and_cli_overrides() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, r#"{"baseUrl": "https://file.example", "defaultTimeoutMs": 1000}"#).unwrap();

		let cli = Cli::parse_from(["fk", "--timeout-ms", "2500", "status"]);
		let config = apply_overrides(load_config(&path).unwrap(), &cli);
		assert_eq!(config.base_url, "https://file.example");
		assert_eq!(config.default_timeout_ms, 2500);

		let cli = Cli::parse_from(["fk", "--base-url", "https://flag.example", "status"]);
		let config = apply_overrides(load_config(&path).unwrap(), &cli);
		assert_eq!(config.base_url, "https://flag.example");
		assert_eq!(config.default_timeout_ms, 1000);
	}

	#[test]
	fn malformed_config_is_reported() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, "{ nope").unwrap();

		let err = load_config(&path).unwrap_err();
		assert!(matches!(err, CliError::Config { .. }));
	}
}
