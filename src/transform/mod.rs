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

//! Conversion of tunnel queries into HTTP requests.
//!
//! A tunnel query is a TXT question in class IN whose QNAME lies under
//! the configured tunnel domain. Which labels mean what is a convention
//! shared with the client that produced the query, so it is left to a
//! [`RequestMapping`]. [`LabelMapping`] is the configurable default.

use std::fmt;

use crate::http::{self, HttpRequest};
use crate::message::{Qclass, Qtype, Question};
use crate::name::Name;

mod mapping;
pub use mapping::{LabelMapping, PayloadEncoding, SEPARATOR_LABEL};

/// A strategy for turning the labels of a tunnel query into an HTTP
/// request.
pub trait RequestMapping {
    /// Builds the request. `relative` holds the labels of the QNAME
    /// that precede `domain`, from left to right.
    fn map(&self, relative: &[&[u8]], domain: &Name) -> Result<HttpRequest, Error>;
}

/// Derives an HTTP request from a decoded DNS question.
///
/// Only TXT questions in class IN are accepted. The QNAME must be equal
/// to or under `domain`; the labels in front of it are handed to
/// `mapping`.
pub fn from_dns_question(
    question: &Question,
    domain: &Name,
    mapping: &dyn RequestMapping,
) -> Result<HttpRequest, Error> {
    if question.qtype != Qtype::TXT || question.qclass != Qclass::IN {
        return Err(Error::UnsupportedQuery {
            qtype: question.qtype,
            qclass: question.qclass,
        });
    }
    let relative: Vec<&[u8]> = question
        .qname
        .relative_to(domain)
        .ok_or(Error::NotInDomain)?
        .collect();
    mapping.map(&relative, domain)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a question could not be turned into a
/// request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The question is not a TXT question in class IN.
    UnsupportedQuery { qtype: Qtype, qclass: Qclass },

    /// The QNAME is not under the tunnel domain.
    NotInDomain,

    /// The payload labels could not be decoded.
    InvalidPayload(&'static str),

    /// The request could not be built.
    Http(http::Error),
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::Http(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedQuery { qtype, qclass } => {
                write!(f, "unsupported query type {} {}", qtype, qclass)
            }
            Self::NotInDomain => f.write_str("name is not in the tunnel domain"),
            Self::InvalidPayload(reason) => write!(f, "invalid payload: {}", reason),
            Self::Http(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
