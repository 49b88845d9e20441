// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Network I/O for running the gateway.
//!
//! The [`Gateway`] is a single-threaded, readiness-driven event loop.
//! It waits with `poll` on one UDP listener, a control wake-up pipe and
//! every open outbound [`Connection`], which it keeps in a bounded
//! [`ConnectionTable`]. Tunnel queries arriving on the listener are
//! turned into HTTP requests (see [`crate::transform`]) and sent over
//! new connections; stop, reload and report requests arrive through
//! [`Controller`] from signals or a [`ControlHandle`].

mod connection;
mod control;
mod event_loop;
mod table;

pub use connection::{Connection, ReadOutcome};
pub use control::{Control, ControlHandle, Controller};
pub use event_loop::{Gateway, GatewayConfig, Reloader, Settings, State, Stats, RECV_BUFFER_SIZE};
pub use table::{ConnectionTable, Handle, Iter};
