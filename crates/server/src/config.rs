// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Server configuration loaded from `APP_*` environment variables.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, bail};
use explorer_common::{logging::LoggerConfig, network::is_valid_network_alias};

use crate::{cache::DEFAULT_NETWORK_CACHE_CAPACITY, registry::DEFAULT_OUTBOUND_CAPACITY};

/// Default network alias.
pub const DEFAULT_NETWORK: &str = "test";

/// Default server version, whose major part selects the route prefix.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Default listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Explorer server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Served network aliases. Always contains `default_network`.
    pub networks: Vec<String>,
    /// Network used when a request selects none.
    pub default_network: String,
    pub logging: LoggerConfig,
    pub listen_addr: SocketAddr,
    /// Whether the subscription endpoint is mounted.
    pub start_ws_server: bool,
    pub version: String,
    pub network_cache_capacity: usize,
    /// Per-connection outbound frame queue size.
    pub ws_outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            networks: vec![DEFAULT_NETWORK.to_string()],
            default_network: DEFAULT_NETWORK.to_string(),
            logging: LoggerConfig::default(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            start_ws_server: true,
            version: DEFAULT_VERSION.to_string(),
            network_cache_capacity: DEFAULT_NETWORK_CACHE_CAPACITY,
            ws_outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from the process environment, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which returns the value of a variable by name.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let default_network = get("APP_DEFAULT_NETWORK").unwrap_or(defaults.default_network);
        if !is_valid_network_alias(&default_network) {
            bail!("Invalid APP_DEFAULT_NETWORK '{default_network}'");
        }

        let mut networks = Vec::new();
        if let Some(list) = get("APP_NETWORKS") {
            for alias in list.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                if !is_valid_network_alias(alias) {
                    bail!("Invalid network '{alias}' in APP_NETWORKS");
                }
                if !networks.iter().any(|n| n == alias) {
                    networks.push(alias.to_string());
                }
            }
        }
        if !networks.contains(&default_network) {
            networks.push(default_network.clone());
        }

        let level = match get("APP_LOG_LEVEL") {
            Some(value) => LoggerConfig::parse_level(&value).context("parse APP_LOG_LEVEL")?,
            None => defaults.logging.level,
        };

        let port = match get("APP_LISTEN_PORT") {
            Some(value) => parse_port(&value)?,
            None => DEFAULT_LISTEN_PORT,
        };
        let ip: IpAddr = match get("APP_LISTEN_IP") {
            Some(value) => value
                .parse()
                .with_context(|| format!("parse APP_LISTEN_IP '{value}'"))?,
            None => defaults.listen_addr.ip(),
        };

        let start_ws_server = get("APP_START_WS_SERVER").is_none_or(|value| value == "true");

        let version = get("APP_VERSION").unwrap_or(defaults.version);
        api_major_version(&version)?;

        let network_cache_capacity = parse_capacity(
            "APP_NETWORK_CACHE_CAPACITY",
            get("APP_NETWORK_CACHE_CAPACITY"),
            defaults.network_cache_capacity,
        )?;
        let ws_outbound_capacity = parse_capacity(
            "APP_WS_OUTBOUND_CAPACITY",
            get("APP_WS_OUTBOUND_CAPACITY"),
            defaults.ws_outbound_capacity,
        )?;

        Ok(Self {
            networks,
            default_network,
            logging: LoggerConfig {
                level,
                ..defaults.logging
            },
            listen_addr: SocketAddr::new(ip, port),
            start_ws_server,
            version,
            network_cache_capacity,
            ws_outbound_capacity,
        })
    }

    /// Returns the API route prefix, e.g. `/api/v1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is invalid.
    pub fn api_prefix(&self) -> anyhow::Result<String> {
        Ok(format!("/api/v{}", api_major_version(&self.version)?))
    }

    /// Returns whether `alias` is served.
    #[must_use]
    pub fn serves(&self, alias: &str) -> bool {
        self.networks.iter().any(|n| n == alias)
    }
}

/// Returns the major part of `version`, which must be a number of at least 1.
///
/// # Errors
///
/// Returns an error if the major part is not a positive number.
pub fn api_major_version(version: &str) -> anyhow::Result<u32> {
    let major = version.trim().split('.').next().unwrap_or_default();
    let major: u32 = major
        .parse()
        .with_context(|| format!("Invalid version '{version}'"))?;
    if major < 1 {
        bail!("Invalid version '{version}': major version must be at least 1");
    }
    Ok(major)
}

fn parse_port(value: &str) -> anyhow::Result<u16> {
    let port: u16 = value
        .parse()
        .with_context(|| format!("parse APP_LISTEN_PORT '{value}'"))?;
    if port == 0 {
        bail!("APP_LISTEN_PORT must be between 1 and 65535");
    }
    Ok(port)
}

fn parse_capacity(name: &str, value: Option<String>, default: usize) -> anyhow::Result<usize> {
    let Some(value) = value else {
        return Ok(default);
    };
    let capacity: usize = value
        .parse()
        .with_context(|| format!("parse {name} '{value}'"))?;
    if capacity == 0 {
        bail!("{name} must be at least 1");
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;
    use rstest::rstest;
    use tracing::Level;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: AHashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[rstest]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.networks, vec!["test".to_string()]);
        assert_eq!(config.default_network, "test");
        assert_eq!(config.logging.level, Level::WARN);
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.start_ws_server);
        assert_eq!(config.api_prefix().unwrap(), "/api/v1");
        assert_eq!(config.network_cache_capacity, 16);
        assert_eq!(config.ws_outbound_capacity, 256);
    }

    #[rstest]
    fn test_overrides() {
        let config = load(&[
            ("APP_NETWORKS", "main, test,main"),
            ("APP_DEFAULT_NETWORK", "main"),
            ("APP_LOG_LEVEL", "debug"),
            ("APP_LISTEN_IP", "127.0.0.1"),
            ("APP_LISTEN_PORT", "9000"),
            ("APP_START_WS_SERVER", "false"),
            ("APP_VERSION", "2.3.1"),
        ])
        .unwrap();

        assert_eq!(config.networks, vec!["main".to_string(), "test".to_string()]);
        assert!(config.serves("test"));
        assert!(!config.serves("dev"));
        assert_eq!(config.logging.level, Level::DEBUG);
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert!(!config.start_ws_server);
        assert_eq!(config.api_prefix().unwrap(), "/api/v2");
    }

    #[rstest]
    #[case("APP_LISTEN_PORT", "0")]
    #[case("APP_LISTEN_PORT", "70000")]
    #[case("APP_LISTEN_IP", "localhost")]
    #[case("APP_LOG_LEVEL", "LOUD")]
    #[case("APP_VERSION", "0.9.0")]
    #[case("APP_VERSION", "next")]
    #[case("APP_NETWORKS", "test,bad alias")]
    #[case("APP_WS_OUTBOUND_CAPACITY", "0")]
    fn test_invalid_values(#[case] name: &str, #[case] value: &str) {
        assert!(load(&[(name, value)]).is_err());
    }

    #[rstest]
    #[case("1.0.0", 1)]
    #[case("3", 3)]
    #[case(" 12.1 ", 12)]
    fn test_api_major_version(#[case] version: &str, #[case] expected: u32) {
        assert_eq!(api_major_version(version).unwrap(), expected);
    }
}
