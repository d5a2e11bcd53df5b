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

//! Common test related helper functions.

use std::{future::Future, time::Duration};

use crate::consts::PUBLIC_KEY_PREFIX;

/// Repeatedly evaluates an async `condition` until it returns `true` or `timeout` elapses.
///
/// # Panics
///
/// Panics if the condition is not met before the timeout.
pub async fn wait_until_async<F, Fut>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(
        result.is_ok(),
        "Timeout waiting for condition after {timeout:?}"
    );
}

/// Returns a deterministic, well-formed public key for `seed`.
#[must_use]
pub fn test_public_key(seed: u32) -> String {
    format!("{PUBLIC_KEY_PREFIX}{seed:0>61}")
}
