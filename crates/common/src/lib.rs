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

//! Shared building blocks for the explorer synchronization layer.
//!
//! This crate is used by both the client SDK and the server and provides:
//!
//! - The tagged wire codec used for every frame and HTTP body ([`codec`]).
//! - The arbitrary-precision [`numeric::Numeric`] value type.
//! - Subscription channels, frame types and connection states ([`enums`], [`messages`]).
//! - Network selection passed between client and server ([`network`]).
//! - Shared response models ([`models`]).
//! - Logging initialization and async test helpers.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod codec;
pub mod consts;
pub mod enums;
pub mod logging;
pub mod messages;
pub mod models;
pub mod network;
pub mod numeric;
pub mod testing;
pub mod time;
