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

//! Provides the [`Type`] structure for DNS RR types.

use std::fmt;
use std::str::FromStr;

use crate::message::Qtype;
use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// Represents the RR type of a DNS record.
///
/// An RR type is represented on the wire as an unsigned 16-bit integer.
/// Hence this is basically a wrapper around `u16` with nice
/// [`Debug`](fmt::Debug), [`Display`](fmt::Display), and [`FromStr`]
/// implementations for working with the common textual representations
/// of RR types. Constants are provided for the types in the IANA
/// registry that show up in practice (e.g. [`Type::TXT`]). Unknown
/// values are displayed and parsed with the generic `TYPEnnn` syntax.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

/// Defines the [`Type`] constants along with their mnemonics, so that
/// the constant list, [`Display`](fmt::Display), and [`FromStr`] can't
/// drift apart.
macro_rules! define_types {
    ($($name:ident = $value:literal,)*) => {
        impl Type {
            $(pub const $name: Type = Type($value);)*

            /// Returns the mnemonic for this type, if it has one.
            pub fn mnemonic(self) -> Option<&'static str> {
                match self {
                    $(Self::$name => Some(stringify!($name)),)*
                    _ => None,
                }
            }

            /// Looks up a type by its mnemonic, ignoring ASCII case.
            fn from_mnemonic(text: &str) -> Option<Self> {
                $(
                    if Caseless(text) == Caseless(stringify!($name)) {
                        return Some(Self::$name);
                    }
                )*
                None
            }
        }
    };
}

define_types! {
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,
    PTR = 12,
    HINFO = 13,
    MX = 15,
    TXT = 16,
    RP = 17,
    AFSDB = 18,
    SIG = 24,
    KEY = 25,
    AAAA = 28,
    LOC = 29,
    SRV = 33,
    NAPTR = 35,
    CERT = 37,
    DNAME = 39,
    OPT = 41,
    APL = 42,
    DS = 43,
    SSHFP = 44,
    IPSECKEY = 45,
    RRSIG = 46,
    NSEC = 47,
    DNSKEY = 48,
    DHCID = 49,
    NSEC3 = 50,
    NSEC3PARAM = 51,
    TLSA = 52,
    HIP = 55,
    CDS = 59,
    CDNSKEY = 60,
    TKEY = 249,
    TSIG = 250,
    CAA = 257,
    TA = 32768,
    DLV = 32769,
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl From<Qtype> for Type {
    fn from(qtype: Qtype) -> Self {
        Self(qtype.into())
    }
}

impl FromStr for Type {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Some(rr_type) = Self::from_mnemonic(text) {
            Ok(rr_type)
        } else if text
            .get(0..4)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case("TYPE"))
        {
            text[4..]
                .parse::<u16>()
                .map(Self::from)
                .or(Err("type value is not a valid unsigned 16-bit integer"))
        } else {
            Err("unknown type")
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.mnemonic() {
            Some(mnemonic) => f.write_str(mnemonic),
            None => write!(f, "TYPE{}", self.0), // RFC 3597 § 5
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
    fn type_displays_according_to_rfc3597() {
        // TYPE65280 is from the private use range, so it should always
        // be unknown.
        let rr_type = Type::from(0xff00);
        assert_eq!(rr_type.to_string(), "TYPE65280");
    }

    #[test]
    fn type_parses_according_to_rfc3597() {
        let type_a: Type = "TYPE1".parse().unwrap();
        let type_65280: Type = "TYPE65280".parse().unwrap();
        assert_eq!(type_a, Type::A);
        assert_eq!(u16::from(type_65280), 65280);
    }

    #[test]
    fn mnemonics_round_trip() {
        for rr_type in [Type::TXT, Type::NSEC3PARAM, Type::DLV, Type::CAA] {
            let text = rr_type.to_string();
            assert_eq!(text.to_ascii_lowercase().parse::<Type>(), Ok(rr_type));
        }
        assert_eq!(Type::TXT.mnemonic(), Some("TXT"));
        assert_eq!(Type::from(0).mnemonic(), None);
    }
}
