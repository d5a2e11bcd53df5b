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

//! Network primitives for the explorer synchronization layer.
//!
//! - [`coalescer::BatchCoalescer`]: collapses concurrent single-key lookups into bulk requests.
//! - [`degrading::DegradingFetch`]: splits bulk requests and shrinks them on size-limit errors.
//! - [`http::HttpTransport`]: codec-aware HTTP GETs with cancellable pending requests.
//! - [`websocket::config::WebSocketConfig`]: client socket settings.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod coalescer;
pub mod degrading;
pub mod error;
pub mod http;
pub mod pending;
pub mod split;
pub mod websocket;
