// Copyright 2021 Matthew Ingwersen.
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

//! Basic types describing DNS resource records.
//!
//! The gateway never interprets RDATA, so only the RR TYPE and TTL
//! live here. Reading whole records from a message is done by
//! [`ResourceRecord`](crate::message::ResourceRecord).

mod rr_type;
mod ttl;
pub use rr_type::Type;
pub use ttl::Ttl;
