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

//! Explorer server binary serving in-memory ledgers for the configured networks.

use std::{future::Future, sync::Arc};

use explorer_common::logging::init_logging;
use explorer_server::{
    AppState, ServerConfig, build_router,
    ledger::{AccountInfo, MemoryLedgerFactory},
};

/// Base token of the in-memory development ledgers.
const DEV_BASE_TOKEN: &str = "keeta_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_logging(&config.logging)?;

    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.listen_addr;
    let state = build_state(config);
    let app = build_router(state)?;

    tracing::info!(%addr, "Explorer server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        () = &mut shutdown => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

fn build_state(config: ServerConfig) -> AppState {
    let factory = MemoryLedgerFactory::with_networks(config.networks.clone(), DEV_BASE_TOKEN);
    for alias in &config.networks {
        if let Some(ledger) = factory.ledger(alias) {
            ledger.insert(AccountInfo::token(DEV_BASE_TOKEN, "KTA", "Base token"));
        }
    }
    AppState::new(config, Arc::new(factory))
}
