use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use runbench_core::{CoordinatorConfig, ScriptEntry, StaticScriptCatalog};
use serde::Deserialize;
use tracing::warn;

/// One catalog entry as declared in the config file. The directory scan that
/// discovers scripts lives outside this service; deployments list what they
/// expose.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDef {
    pub id: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Root for run records and captured artifacts.
    pub data_dir: PathBuf,
    pub run_timeout_secs: u64,
    pub kill_grace_secs: u64,
    pub scripts: Vec<ScriptDef>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8095".parse().expect("static addr"),
            data_dir: PathBuf::from("./data"),
            run_timeout_secs: 300,
            kill_grace_secs: 2,
            scripts: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file; a missing file yields defaults so the server
    /// can come up empty in development.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            kill_grace: Duration::from_secs(self.kill_grace_secs),
        }
    }

    pub fn catalog(&self) -> StaticScriptCatalog {
        StaticScriptCatalog::new(self.scripts.iter().map(|script| {
            ScriptEntry::new(
                script.id.clone(),
                script.program.clone(),
                script.args.clone(),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbench_core::ScriptCatalog;

    #[test]
    fn parses_full_config() {
        let raw = r#"
            bind_addr = "0.0.0.0:9000"
            data_dir = "/var/lib/runbench"
            run_timeout_secs = 120
            kill_grace_secs = 5

            [[scripts]]
            id = "fib"
            program = "node"
            args = ["benches/fib.js"]

            [[scripts]]
            id = "sort"
            program = "node"
            args = ["benches/sort.js"]
        "#;
        let config: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.run_timeout_secs, 120);

        let catalog = config.catalog();
        assert!(catalog.contains("fib"));
        assert!(catalog.contains("sort"));
        assert_eq!(catalog.resolve("fib").unwrap().program, "node");
    }

    #[test]
    fn omitted_fields_fall_back_to_defaults() {
        let config: ServerConfig = toml::from_str("run_timeout_secs = 60").unwrap();
        assert_eq!(config.run_timeout_secs, 60);
        assert_eq!(config.kill_grace_secs, 2);
        assert!(config.scripts.is_empty());
    }
}
