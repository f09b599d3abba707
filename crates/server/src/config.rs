//! Server configuration.
//!
//! A YAML options record. The path comes from the `CONFIG` environment
//! variable; when unset, `./gedis.yaml` is used if it exists, otherwise the
//! defaults apply.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "gedis.yaml";
pub const CONFIG_ENV_VAR: &str = "CONFIG";

const DEFAULT_DATABASES: usize = 16;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerProperties {
    pub bind: String,
    pub port: u16,
    pub maxclients: usize,
    pub requirepass: String,
    pub databases: usize,
    /// Recognized for compatibility; replication is not supported.
    pub peers: Vec<String>,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6399,
            maxclients: 1000,
            requirepass: String::new(),
            databases: DEFAULT_DATABASES,
            peers: Vec::new(),
        }
    }
}

impl ServerProperties {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut props: ServerProperties = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if props.databases == 0 {
            props.databases = DEFAULT_DATABASES;
        }
        Ok(props)
    }

    /// Resolve the effective configuration: explicit path, then the `CONFIG`
    /// environment variable, then `./gedis.yaml`, then defaults.
    pub fn resolve(override_path: Option<&str>) -> Result<Self> {
        if let Some(path) = override_path {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::load(path);
            }
        }
        if Path::new(DEFAULT_CONFIG_FILE).is_file() {
            return Self::load(DEFAULT_CONFIG_FILE);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let props = ServerProperties::default();
        assert_eq!(props.bind, "0.0.0.0");
        assert_eq!(props.port, 6399);
        assert_eq!(props.maxclients, 1000);
        assert!(props.requirepass.is_empty());
        assert_eq!(props.databases, 16);
        assert!(props.peers.is_empty());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let props: ServerProperties = serde_yaml::from_str("port: 7000\nrequirepass: hunter2\n")
            .expect("valid yaml");
        assert_eq!(props.port, 7000);
        assert_eq!(props.requirepass, "hunter2");
        assert_eq!(props.bind, "0.0.0.0");
        assert_eq!(props.databases, 16);
    }

    #[test]
    fn full_yaml_round_trip() {
        let yaml = "\
bind: 127.0.0.1
port: 6400
maxclients: 50
requirepass: secret
databases: 4
peers:
  - 10.0.0.1:6399
  - 10.0.0.2:6399
";
        let props: ServerProperties = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(props.bind, "127.0.0.1");
        assert_eq!(props.port, 6400);
        assert_eq!(props.maxclients, 50);
        assert_eq!(props.databases, 4);
        assert_eq!(props.peers.len(), 2);
    }

    #[test]
    fn zero_databases_normalizes_on_load() {
        let dir = std::env::temp_dir().join("gedis-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("zero-databases.yaml");
        std::fs::write(&path, "databases: 0\n").unwrap();
        let props = ServerProperties::load(&path).unwrap();
        assert_eq!(props.databases, 16);
    }
}
