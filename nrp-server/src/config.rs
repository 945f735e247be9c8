//! Service configuration resolution
//!
//! Every setting resolves with the same priority: command line (which also
//! covers its `NRP_*` environment variable) → TOML config file → compiled
//! default.

use nrp_common::config::{resolve_root_folder, RootFolder, TomlConfig};
use nrp_common::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::{RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "*";

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub root_folder: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub allowed_origin: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub root_folder: RootFolder,
    pub upload_dir: PathBuf,
    pub allowed_origin: String,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl ServerConfig {
    pub fn resolve(overrides: &ServerOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let root_folder = RootFolder::new(resolve_root_folder(
            overrides.root_folder.as_deref(),
            toml_config,
        ));

        let upload_dir = overrides
            .upload_dir
            .clone()
            .or_else(|| toml_config.upload_dir.clone())
            .unwrap_or_else(|| root_folder.default_upload_dir());

        let bind = overrides
            .bind_address
            .as_deref()
            .or(toml_config.bind_address.as_deref())
            .unwrap_or(DEFAULT_BIND_ADDRESS);
        let bind_address = bind
            .parse::<IpAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

        let allowed_origin = overrides
            .allowed_origin
            .clone()
            .or_else(|| toml_config.allowed_origin.clone())
            .filter(|origin| !origin.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string());

        let max_upload_bytes = toml_config
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than 0".to_string()));
        }

        let log_level = overrides
            .log_level
            .clone()
            .unwrap_or_else(|| toml_config.logging.level.clone());

        Ok(Self {
            bind_address,
            port: overrides.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            root_folder,
            upload_dir,
            allowed_origin,
            max_upload_bytes,
            log_level,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            allowed_origin: self.allowed_origin.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
