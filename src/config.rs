use crate::dns::constants::DEFAULT_UDP_PAYLOAD;
use crate::error::ConfigError;
use crate::store;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Zone file, or directory of `*.zone` files
    pub path: PathBuf,

    /// Store backend identifier
    pub backend: String,

    /// Address to answer queries on
    pub bind_addr: SocketAddr,

    /// Largest response message sent over UDP
    pub max_udp_payload: u16,

    /// Seconds between zone re-syncs while serving (0 = sync once at startup)
    pub sync_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("zones"),
            backend: store::DEFAULT_BACKEND.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1053)),
            max_udp_payload: DEFAULT_UDP_PAYLOAD,
            sync_interval: 300,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `ZONEKEEP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override fields from variables looked up through `var`
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("ZONEKEEP_PATH") {
            self.path = PathBuf::from(path);
        }

        if let Some(backend) = var("ZONEKEEP_BACKEND") {
            self.backend = backend;
        }

        if let Some(bind_addr) = var("ZONEKEEP_BIND_ADDR") {
            self.bind_addr = bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind_addr))?;
        }

        if let Some(payload) = var("ZONEKEEP_MAX_UDP_PAYLOAD") {
            self.max_udp_payload = payload
                .parse()
                .map_err(|_| ConfigError::InvalidPayloadSize(payload))?;
        }

        if let Some(interval) = var("ZONEKEEP_SYNC_INTERVAL") {
            self.sync_interval = interval
                .parse()
                .map_err(|_| ConfigError::InvalidSyncInterval(interval))?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !store::BACKENDS.contains(&self.backend.as_str()) {
            return Err(ConfigError::UnavailableBackend(self.backend.clone()));
        }

        // Anything below the classic limit cannot carry a minimal answer
        if self.max_udp_payload < DEFAULT_UDP_PAYLOAD {
            return Err(ConfigError::InvalidPayloadSize(format!(
                "{} is below the minimum of {}",
                self.max_udp_payload, DEFAULT_UDP_PAYLOAD
            )));
        }

        Ok(())
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval > 0).then(|| Duration::from_secs(self.sync_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend, "memory");
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("ZONEKEEP_PATH", "/srv/zones"),
                ("ZONEKEEP_BIND_ADDR", "0.0.0.0:53"),
                ("ZONEKEEP_MAX_UDP_PAYLOAD", "1232"),
                ("ZONEKEEP_SYNC_INTERVAL", "0"),
            ]))
            .unwrap();
        assert_eq!(config.path, PathBuf::from("/srv/zones"));
        assert_eq!(config.bind_addr.port(), 53);
        assert_eq!(config.max_udp_payload, 1232);
        assert_eq!(config.sync_interval(), None);
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.apply_env(env(&[("ZONEKEEP_BIND_ADDR", "nowhere")])),
            Err(ConfigError::InvalidBindAddress(_))
        ));
        assert!(matches!(
            config.apply_env(env(&[("ZONEKEEP_MAX_UDP_PAYLOAD", "70000")])),
            Err(ConfigError::InvalidPayloadSize(_))
        ));
        assert!(matches!(
            config.apply_env(env(&[("ZONEKEEP_SYNC_INTERVAL", "-1")])),
            Err(ConfigError::InvalidSyncInterval(_))
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = ServerConfig {
            backend: "lmdb".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnavailableBackend("lmdb".to_string()))
        );
    }

    #[test]
    fn test_small_payload_rejected() {
        let config = ServerConfig {
            max_udp_payload: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
path = "/var/lib/zones"
bind_addr = "[::1]:5353"
sync_interval = 60
"#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("/var/lib/zones"));
        assert_eq!(config.bind_addr, "[::1]:5353".parse().unwrap());
        assert_eq!(config.backend, "memory");
        assert_eq!(config.max_udp_payload, 512);

        assert!(matches!(
            ServerConfig::from_toml_str("backend = 3"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(ServerConfig::from_toml_str("color = \"blue\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zonekeep.toml");
        std::fs::write(&path, "backend = \"memory\"\nmax_udp_payload = 4096\n").unwrap();
        assert_eq!(ServerConfig::from_file(&path).unwrap().max_udp_payload, 4096);
        assert!(matches!(
            ServerConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
