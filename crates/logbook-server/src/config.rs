//! Logbook Server Configuration
//!
//! Server configuration for binding, storage location and the embedded
//! recorder settings.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use logbook_common::config::LogbookConfig;
use logbook_common::{LogbookError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Directory holding the track database. In-memory when unset.
    pub data_dir: Option<String>,
    pub logbook: LogbookConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
            data_dir: None,
            logbook: LogbookConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server config with the specified host and port.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Load a server config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| LogbookError::Configuration(e.to_string()))?;
        config.logbook.validate()?;
        Ok(config)
    }

    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.port)))
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the data directory for the track database.
    pub fn with_data_dir(mut self, data_dir: Option<String>) -> Self {
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        self
    }

    /// Override the self context.
    pub fn with_self_context(mut self, context: Option<String>) -> Self {
        if let Some(context) = context {
            self.logbook.recorder.self_context = context;
        }
        self
    }

    pub fn with_record_track(mut self, enabled: bool) -> Self {
        self.logbook.recorder.record_track = enabled;
        self
    }

    /// Resolved location of the track database, if persistent.
    pub fn track_database_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| Path::new(dir).join(&self.logbook.tracks.database_path))
    }
}

// =============================================================================
// Tests
// =============================================================================
