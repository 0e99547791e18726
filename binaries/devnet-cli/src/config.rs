//! CLI configuration.
//!
//! The configuration file holds the cluster overrides at the top level, so
//! the same file can be handed to `ClusterOverrides::from_file`, plus an
//! optional `[logging]` table used only by the CLI.

use std::path::Path;

use devnet_orchestrator::config::ClusterOverrides;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Cluster overrides.
    #[serde(flatten)]
    pub cluster: ClusterOverrides,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        if let Some(ref name) = args.cluster_name {
            self.cluster.cluster_name = Some(name.clone());
        }

        if let Some(port) = args.node_port {
            self.cluster = std::mem::take(&mut self.cluster).node_port(port);
        }
        if let Some(port) = args.indexer_port {
            self.cluster = std::mem::take(&mut self.cluster).indexer_port(port);
        }
        if let Some(port) = args.proof_server_port {
            self.cluster = std::mem::take(&mut self.cluster).proof_server_port(port);
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        if let Some(name) = &self.cluster.cluster_name {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
            if !valid {
                anyhow::bail!("Invalid cluster name: {:?}", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use devnet_orchestrator::config::ClusterConfig;
    use std::io::Write;

    #[test]
    fn test_file_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
cluster_name = "t1"

[node]
port = 19944

[proof_server]
params_cache = "/var/cache/zk"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");

        let resolved = ClusterConfig::resolve(&config.cluster);
        assert_eq!(resolved.cluster_name, "t1");
        assert_eq!(resolved.node.port, 19944);
        assert_eq!(resolved.indexer.port, 8088);
        assert!(resolved.proof_server.params_cache.is_some());
    }

    #[test]
    fn test_cli_args_override_file() {
        let mut config = CliConfig {
            cluster: ClusterOverrides::named("from-file").node_port(19944),
            ..Default::default()
        };
        let args = super::super::CliArgs::parse_from([
            "devnet",
            "--cluster-name",
            "from-cli",
            "--indexer-port",
            "18088",
            "--log-level",
            "warn",
            "endpoints",
        ]);

        config.merge_cli_args(&args);
        config.validate().unwrap();

        let resolved = ClusterConfig::resolve(&config.cluster);
        assert_eq!(resolved.cluster_name, "from-cli");
        assert_eq!(resolved.node.port, 19944);
        assert_eq!(resolved.indexer.port, 18088);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CliConfig::default();
        config.validate().unwrap();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let config = CliConfig {
            cluster: ClusterOverrides::named("has space"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
