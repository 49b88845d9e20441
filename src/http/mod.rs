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

//! HTTP requests sent on behalf of tunnel queries.
//!
//! Only the request side of HTTP/1.1 is implemented: an
//! [`HttpRequest`] is serialized into bytes to be written to the
//! destination, whose response is not interpreted.

use std::fmt;

pub mod form;
mod request;
mod resolve;
pub use request::{Headers, HttpRequest, Method};
pub use resolve::{resolve_destination, Resolver, SystemResolver};

/// An error related to an [`HttpRequest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Form text was not valid `application/x-www-form-urlencoded`
    /// (bad percent-escape or not UTF-8 once decoded).
    InvalidForm,

    /// The destination host could not be resolved.
    ResolutionFailed { host: String, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidForm => f.write_str("invalid URL-encoded form"),
            Self::ResolutionFailed { host, reason } => {
                write!(f, "failed to resolve {}: {}", host, reason)
            }
        }
    }
}

impl std::error::Error for Error {}
