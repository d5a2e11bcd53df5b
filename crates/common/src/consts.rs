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

//! Constants shared between the explorer client and server.

/// Current API major version used in route prefixes (`/api/v1/...`).
pub const API_MAJOR_VERSION: u32 = 1;

/// Prefix every valid ledger public key starts with.
pub const PUBLIC_KEY_PREFIX: &str = "keeta_";

/// Accepted encoded public key lengths (with and without the type marker).
pub const PUBLIC_KEY_LENGTHS: [usize; 2] = [67, 69];

/// Header carrying the selected network alias.
pub const HEADER_NETWORK_ALIAS: &str = "x-network-alias";

/// Header carrying a custom representative host.
pub const HEADER_NETWORK_HOST: &str = "x-network-host";

/// Header carrying whether the custom host uses TLS.
pub const HEADER_NETWORK_SSL: &str = "x-network-ssl";

/// Header carrying the representative key for a custom host.
pub const HEADER_NETWORK_REP_KEY: &str = "x-network-rep-key";

/// Tag used on the wire for current arbitrary-precision numbers.
pub const TAG_NUMERIC: &str = "num";

/// Tag used on the wire by older producers for arbitrary-precision numbers.
pub const TAG_NUMERIC_LEGACY: &str = "oldnum";

/// Builtin (non-custom) annotation for big integers.
pub const TAG_BIGINT: &str = "bigint";

/// Returns whether `key` has the shape of a ledger public key.
#[must_use]
pub fn is_valid_public_key(key: &str) -> bool {
    key.starts_with(PUBLIC_KEY_PREFIX)
        && PUBLIC_KEY_LENGTHS.contains(&key.len())
        && key[PUBLIC_KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
