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

//! Client SDK for the explorer API.
//!
//! - [`sdk::ExplorerClient`]: entry point combining HTTP lookups and the real-time socket.
//! - [`batcher::TokenBatcher`]: coalesces token lookups into bulk requests.
//! - [`websocket::ExplorerWebSocketClient`]: subscription channels over a reconnecting socket.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod batcher;
pub mod config;
pub mod error;
pub mod sdk;
pub mod websocket;

pub use crate::{
    config::ExplorerClientConfig,
    error::{ExplorerClientError, ExplorerClientResult},
    sdk::ExplorerClient,
};
