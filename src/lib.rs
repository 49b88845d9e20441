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

//! An HTTP-over-DNS gateway.
//!
//! The gateway listens for DNS queries over UDP, decodes them (see
//! [`message`] and [`name`]), turns accepted TXT questions into HTTP
//! requests (see [`transform`] and [`http`]), and forwards those
//! requests to their destinations over outbound connections managed by
//! a single-threaded event loop (see [`io`]).

pub mod class;
pub mod http;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod transform;
mod util;
