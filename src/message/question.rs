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

//! Implementation of types relating to DNS questions.

use std::fmt;
use std::str::FromStr;

use super::reader::{read_u16, Decode, Error, Result};
use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;
use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// QUESTIONS                                                          //
////////////////////////////////////////////////////////////////////////

/// The question of a DNS query.
///
/// Defined in [RFC 1035 § 4.1.2], a DNS question includes
///
/// * the QNAME, which is the domain name whose records are being
///   queried;
/// * the [QTYPE](Qtype), which specifies what types of records are
///   desired; and
/// * the [QCLASS](Qclass), which specifies which DNS class(es) to search.
///
/// For the gateway, a question is the unit of work: each TXT question
/// under the tunnel domain becomes one HTTP request.
///
/// [RFC 1035 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Question {
    pub qname: Name,
    pub qtype: Qtype,
    pub qclass: Qclass,
}

impl Decode<'_> for Question {
    fn decode(octets: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, qname_len) =
            Name::try_from_compressed(octets, offset).map_err(Error::InvalidOwner)?;
        let qname_end = offset + qname_len;
        let qtype = read_u16(octets, qname_end)?.into();
        let qclass = read_u16(octets, qname_end + 2)?.into();
        let question = Self {
            qname,
            qtype,
            qclass,
        };
        Ok((question, qname_end + 4))
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qtype, self.qclass, self.qname)
    }
}

////////////////////////////////////////////////////////////////////////
// QTYPES                                                             //
////////////////////////////////////////////////////////////////////////

/// The QTYPE of a DNS [question](Question).
///
/// The QTYPE determines what type of DNS records are desired. QTYPE
/// values include data TYPEs (see [`Type`]), but may also include
/// other values that often indicate that a range of TYPEs are desired
/// (e.g. [MAILB](Qtype::MAILB) and [*](Qtype::ANY)), or ask for zone
/// transfers (e.g. [AXFR](Qtype::AXFR)).
///
/// A QTYPE is represented on the wire as an unsigned 16-bit integer.
/// Hence this is basically a wrapper around [`u16`] with nice
/// [`Debug`](fmt::Debug), [`Display`](fmt::Display), and [`FromStr`]
/// implementations. Value 0 is reserved and displays as `TYPE0`.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    /// The QTYPE carrying tunnel payloads.
    pub const TXT: Self = Self(16);

    // RFC 1995
    pub const IXFR: Self = Self(251);

    // RFC 1035
    pub const AXFR: Self = Self(252);
    pub const MAILB: Self = Self(253);
    pub const MAILA: Self = Self(254);
    pub const ANY: Self = Self(255);
}

impl From<u16> for Qtype {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qtype> for u16 {
    fn from(qtype: Qtype) -> Self {
        qtype.0
    }
}

impl From<Type> for Qtype {
    fn from(rr_type: Type) -> Self {
        Self(rr_type.into())
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IXFR => f.write_str("IXFR"),
            Self::AXFR => f.write_str("AXFR"),
            Self::MAILB => f.write_str("MAILB"),
            Self::MAILA => f.write_str("MAILA"),
            Self::ANY => f.write_str("*"),
            _ => Type::from(*self).fmt(f),
        }
    }
}

impl fmt::Debug for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Qtype {
    type Err = &'static str;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let mnemonic = Caseless(text);
        [
            ("IXFR", Self::IXFR),
            ("AXFR", Self::AXFR),
            ("MAILB", Self::MAILB),
            ("MAILA", Self::MAILA),
            ("ANY", Self::ANY),
            ("*", Self::ANY),
        ]
        .into_iter()
        .find(|(candidate, _)| mnemonic == Caseless(*candidate))
        .map_or_else(|| Type::from_str(text).map(Into::into), |(_, qtype)| Ok(qtype))
    }
}

////////////////////////////////////////////////////////////////////////
// QCLASSES                                                           //
////////////////////////////////////////////////////////////////////////

/// The QCLASS of a DNS [question](Question).
///
/// The QCLASS determines which DNS class(es) to search for records.
/// This may be a defined DNS [CLASS](Class), or it may be another
/// value such as [*](Qclass::ANY) that asks for certain groups of
/// CLASSes.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qclass(u16);

impl Qclass {
    pub const IN: Self = Self(1);

    // RFC 2136
    pub const NONE: Self = Self(254);

    // RFC 1035
    pub const ANY: Self = Self(255);
}

impl From<u16> for Qclass {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qclass> for u16 {
    fn from(qclass: Qclass) -> Self {
        qclass.0
    }
}

impl From<Class> for Qclass {
    fn from(class: Class) -> Self {
        Self(class.into())
    }
}

impl fmt::Display for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("NONE"),
            Self::ANY => f.write_str("*"),
            _ => Class::from(*self).fmt(f),
        }
    }
}

impl fmt::Debug for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Qclass {
    type Err = &'static str;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let mnemonic = Caseless(text);
        if mnemonic == Caseless("NONE") {
            Ok(Self::NONE)
        } else if mnemonic == Caseless("ANY") || mnemonic == Caseless("*") {
            Ok(Self::ANY)
        } else {
            Class::from_str(text).map(Into::into)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_decodes_and_reports_next_offset() {
        let octets = b"\x03abc\x01$\x03256\x02bz\x00\x00\x10\x00\x01junk";
        let (question, next) = Question::decode(octets, 0).unwrap();
        assert_eq!(question.qname, "abc.$.256.bz.".parse().unwrap());
        assert_eq!(question.qtype, Qtype::TXT);
        assert_eq!(question.qclass, Qclass::IN);
        assert_eq!(next, octets.len() - 4);
        assert_eq!(question.to_string(), "TXT IN abc.$.256.bz.");
    }

    #[test]
    fn question_decode_rejects_truncated_fields() {
        let octets = b"\x03abc\x00\x00\x10\x00";
        assert_eq!(
            Question::decode(octets, 0),
            Err(Error::UnexpectedEomInField)
        );
    }

    #[test]
    fn qtypes_display_and_parse() {
        assert_eq!(Qtype::ANY.to_string(), "*");
        assert_eq!(Qtype::from(0).to_string(), "TYPE0");
        assert_eq!("txt".parse::<Qtype>(), Ok(Qtype::TXT));
        assert_eq!("any".parse::<Qtype>(), Ok(Qtype::ANY));
        assert_eq!("ch".parse::<Qclass>(), Ok(Qclass::from(Class::CH)));
    }
}
