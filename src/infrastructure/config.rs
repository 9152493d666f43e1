use crate::core::{ProfileSnapshot, TransportError, TransportResult};
use crate::file_transfer::quota::StoragePolicy;
use crate::network::{PeerTransport, TransportConfig};
use crate::protocol::{CONTROL_PORT, TRANSFER_PORT};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How this machine introduces itself to peers
    pub profile: ProfileSnapshot,
    pub network: NetworkSettings,
    pub storage: StorageSettings,
}

/// Listener and timeout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub bind_address: String,
    pub control_port: u16,
    pub transfer_port: u16,
    pub connection_timeout_seconds: u64,
    /// Unset keeps paused transfers open indefinitely
    pub transfer_idle_timeout_seconds: Option<u64>,
    pub chunk_size: usize,
}

/// Where received files go and how much may land there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub sync_folder: Option<String>,
    /// 0 or unset means unlimited
    pub max_storage_bytes: Option<u64>,
    /// 0 or unset means unlimited
    pub max_file_bytes: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let name = std::env::var("USER").unwrap_or_else(|_| "Poly-Hub User".to_string());
        Self {
            profile: ProfileSnapshot::new(name, "127.0.0.1"),
            network: NetworkSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            bind_address: transport.bind_address.to_string(),
            control_port: CONTROL_PORT,
            transfer_port: TRANSFER_PORT,
            connection_timeout_seconds: transport.connect_timeout.as_secs(),
            transfer_idle_timeout_seconds: None,
            chunk_size: transport.chunk_size,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            sync_folder: Some(format!("{}/Poly-Hub", home)),
            max_storage_bytes: None,
            max_file_bytes: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file or create default
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        if let Some(config) = config_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
        {
            return config;
        }
        Self::default()
    }

    /// Save configuration to file
    pub fn save_to_file(&self, config_path: &str) -> TransportResult {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| TransportError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Get the sync folder as PathBuf
    pub fn sync_folder_path(&self) -> Option<PathBuf> {
        self.storage.sync_folder.as_ref().map(PathBuf::from)
    }

    /// Validate configuration
    pub fn validate(&self) -> TransportResult {
        self.bind_address()?;

        if self.network.chunk_size == 0 {
            return Err(config_error("Chunk size must be greater than 0"));
        }

        if self.network.connection_timeout_seconds == 0 {
            return Err(config_error("Connection timeout must be greater than 0"));
        }

        if self.network.control_port != 0 && self.network.control_port == self.network.transfer_port {
            return Err(config_error("Control and transfer ports must differ"));
        }

        if self.profile.name.trim().is_empty() {
            return Err(config_error("Profile name must not be empty"));
        }

        Ok(())
    }

    /// Listener settings for `PeerTransport::new`
    pub fn transport_config(&self) -> TransportResult<TransportConfig> {
        let mut config = TransportConfig::new(
            Some(self.bind_address()?),
            Some(self.network.control_port),
            Some(self.network.transfer_port),
        )
        .with_chunk_size(self.network.chunk_size)
        .with_idle_timeout(self.network.transfer_idle_timeout_seconds.map(Duration::from_secs));
        config.connect_timeout = Duration::from_secs(self.network.connection_timeout_seconds);
        Ok(config)
    }

    pub fn storage_policy(&self) -> StoragePolicy {
        StoragePolicy {
            sync_folder: self.sync_folder_path(),
            max_storage_bytes: self.storage.max_storage_bytes.filter(|&limit| limit > 0),
            max_file_bytes: self.storage.max_file_bytes.filter(|&limit| limit > 0),
        }
    }

    /// Push the storage settings into a transport
    pub fn apply_to(&self, transport: &PeerTransport) {
        let policy = self.storage_policy();
        transport.set_sync_folder(policy.sync_folder);
        transport.set_storage_limits(policy.max_storage_bytes, policy.max_file_bytes);
    }

    fn bind_address(&self) -> TransportResult<IpAddr> {
        self.network
            .bind_address
            .parse()
            .map_err(|_| config_error(&format!("Invalid bind address: {}", self.network.bind_address)))
    }
}

fn config_error(message: &str) -> TransportError {
    TransportError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        config.validate().expect("Default config should be valid");
        assert_eq!(config.network.control_port, 47777);
        assert_eq!(config.network.transfer_port, 47778);
        assert!(config.sync_folder_path().unwrap().ends_with("Poly-Hub"));
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).expect("Should serialize");
        let deserialized: AppConfig = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"storage":{"max_file_bytes":10}}"#).unwrap();
        assert_eq!(parsed.storage.max_file_bytes, Some(10));
        assert_eq!(parsed.storage.sync_folder, StorageSettings::default().sync_folder);
        assert_eq!(parsed.network, NetworkSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.profile = ProfileSnapshot::new("Alice", "100.1.1.1");
        config.storage.max_storage_bytes = Some(1_000_000);
        config.save_to_file(path).unwrap();

        assert_eq!(AppConfig::load_or_default(Some(path)), config);
        assert_eq!(
            AppConfig::load_or_default(Some("/no/such/config.json")),
            AppConfig::default()
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.network.bind_address = "not-an-ip".to_string();
        assert!(matches!(config.validate(), Err(TransportError::Config(_))));

        let mut config = AppConfig::default();
        config.network.transfer_port = config.network.control_port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_config_and_policy() {
        let mut config = AppConfig::default();
        config.network.transfer_idle_timeout_seconds = Some(30);
        config.storage.max_storage_bytes = Some(0);
        config.storage.max_file_bytes = Some(2048);

        let transport = config.transport_config().unwrap();
        assert_eq!(transport.transfer_idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(transport.connect_timeout, Duration::from_secs(5));

        let peer_transport = PeerTransport::new(transport);
        config.apply_to(&peer_transport);
        let policy = peer_transport.quota().policy();
        assert_eq!(policy.max_storage_bytes, None);
        assert_eq!(policy.max_file_bytes, Some(2048));
        assert_eq!(policy.sync_folder, config.sync_folder_path());
    }
}
