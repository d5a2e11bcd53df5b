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

//! Logging initialization on top of `tracing-subscriber`.

use std::{
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Maximum level emitted when `RUST_LOG` is not set.
    pub level: Level,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            json: false,
        }
    }
}

impl LoggerConfig {
    /// Parses a level name such as `INFO` or `debug`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a known level.
    pub fn parse_level(value: &str) -> anyhow::Result<Level> {
        Level::from_str(value.trim()).map_err(|_| anyhow::anyhow!("Invalid log level '{value}'"))
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. Calling this more than once is a no-op.
///
/// # Errors
///
/// Returns an error if another global subscriber was already installed elsewhere.
pub fn init_logging(config: &LoggerConfig) -> anyhow::Result<()> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}
