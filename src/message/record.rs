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

//! Implementation of the [`ResourceRecord`] type.

use std::fmt;

use super::reader::{read_u16, read_u32, Decode, Error, Result};
use crate::class::Class;
use crate::name::Name;
use crate::rr::{Ttl, Type};

/// A resource record read from the answer, authority, or additional
/// section of a message.
///
/// The RDATA is borrowed from the message and never interpreted, so
/// compressed names inside it are left as they are.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRecord<'a> {
    pub owner: Name,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: &'a [u8],
}

impl<'a> Decode<'a> for ResourceRecord<'a> {
    fn decode(octets: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let (owner, owner_len) =
            Name::try_from_compressed(octets, offset).map_err(Error::InvalidOwner)?;
        let owner_end = offset + owner_len;
        let rr_type = read_u16(octets, owner_end)?.into();
        let class = read_u16(octets, owner_end + 2)?.into();
        let ttl = read_u32(octets, owner_end + 4)?.into();
        let rdlength = read_u16(octets, owner_end + 8)? as usize;
        let rdata_start = owner_end + 10;
        let rdata_end = rdata_start + rdlength;
        let rdata = octets
            .get(rdata_start..rdata_end)
            .ok_or(Error::UnexpectedEomInRdata)?;
        let rr = Self {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
        };
        Ok((rr, rdata_end))
    }
}

/// Displays the record's fields in zone-file order, with the RDATA in
/// the generic `\# len hex` syntax of [RFC 3597 § 5].
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
impl fmt::Display for ResourceRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} \\# {}",
            self.owner,
            self.ttl,
            self.class,
            self.rr_type,
            self.rdata.len()
        )?;
        if !self.rdata.is_empty() {
            f.write_str(" ")?;
            for octet in self.rdata {
                write!(f, "{:02x}", octet)?;
            }
        }
        Ok(())
    }
}
