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

//! Implementation of the [`Opcode`] type.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// OPCODES                                                            //
////////////////////////////////////////////////////////////////////////

/// The opcode value of the DNS message header.
///
/// [RFC 1035 § 4.1.1] defines the opcode field as a four-bit field
/// indicating the kind of query being made in the message. The first
/// three values are from the original specification; NOTIFY and UPDATE
/// come from RFCs 1996 and 2136. Every other value is carried as
/// [`Opcode::Unassigned`], whose [`UnassignedOpcode`] can only be
/// obtained by decoding, so each value has exactly one representation.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unassigned(UnassignedOpcode),
}

impl Opcode {
    /// Converts the four-bit header field into an `Opcode`. Only the
    /// low four bits of `bits` are used.
    pub(super) fn from_bits(bits: u8) -> Self {
        match bits & 0x0f {
            0 => Self::Query,
            1 => Self::IQuery,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            other => Self::Unassigned(UnassignedOpcode(other)),
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = IntoOpcodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 15 {
            Ok(Self::from_bits(value))
        } else {
            Err(IntoOpcodeError)
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unassigned(v) => v.0,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Query => f.write_str("QUERY"),
            Self::IQuery => f.write_str("IQUERY"),
            Self::Status => f.write_str("STATUS"),
            Self::Notify => f.write_str("NOTIFY"),
            Self::Update => f.write_str("UPDATE"),
            Self::Unassigned(v) => write!(f, "OPCODE{}", v.0),
        }
    }
}

/// An opcode value with no assigned meaning. It is never 0, 1, 2, 4
/// or 5.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnassignedOpcode(u8);

impl UnassignedOpcode {
    pub fn value(self) -> u8 {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that the provided value is not a valid opcode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IntoOpcodeError;

impl fmt::Display for IntoOpcodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("not a valid opcode")
    }
}

impl std::error::Error for IntoOpcodeError {}
