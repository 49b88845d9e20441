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

//! Implementation of the [`Header`] type.

use std::fmt;

use super::reader::{Error, Result};
use super::{Opcode, Rcode};

/// The size of the DNS message header.
pub const HEADER_SIZE: usize = 12;

// Flag layout of octets 2 and 3 (RFC 1035 § 4.1.1).
const QR_MASK: u8 = 0x80;
const OPCODE_MASK: u8 = 0x78;
const OPCODE_SHIFT: u32 = 3;
const AA_MASK: u8 = 0x04;
const TC_MASK: u8 = 0x02;
const RD_MASK: u8 = 0x01;
const RA_MASK: u8 = 0x80;
const Z_MASK: u8 = 0x70;
const Z_SHIFT: u32 = 4;
const RCODE_MASK: u8 = 0x0f;

////////////////////////////////////////////////////////////////////////
// HEADER                                                             //
////////////////////////////////////////////////////////////////////////

/// The fixed 12-octet header of a DNS message, decoded.
///
/// The three reserved Z bits are kept as they were received, so that
/// [`Header::encode`] reproduces the octets given to
/// [`Header::decode`] exactly.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: Opcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: Rcode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Decodes the header at the start of `octets`, returning it along
    /// with the number of octets consumed (always [`HEADER_SIZE`]).
    pub fn decode(octets: &[u8]) -> Result<(Self, usize)> {
        let octets: &[u8; HEADER_SIZE] = octets
            .get(..HEADER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(Error::HeaderTooShort)?;
        let word = |i: usize| u16::from_be_bytes([octets[i], octets[i + 1]]);
        let header = Self {
            id: word(0),
            qr: octets[2] & QR_MASK != 0,
            opcode: Opcode::from_bits((octets[2] & OPCODE_MASK) >> OPCODE_SHIFT),
            aa: octets[2] & AA_MASK != 0,
            tc: octets[2] & TC_MASK != 0,
            rd: octets[2] & RD_MASK != 0,
            ra: octets[3] & RA_MASK != 0,
            z: (octets[3] & Z_MASK) >> Z_SHIFT,
            rcode: Rcode::from_bits(octets[3] & RCODE_MASK),
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        };
        Ok((header, HEADER_SIZE))
    }

    /// Encodes the header into its on-the-wire form.
    ///
    /// Out-of-range opcode, Z, and RCODE values are masked to the width
    /// of their fields.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut octets = [0; HEADER_SIZE];
        octets[0..2].copy_from_slice(&self.id.to_be_bytes());
        octets[2] = (u8::from(self.opcode) << OPCODE_SHIFT) & OPCODE_MASK;
        if self.qr {
            octets[2] |= QR_MASK;
        }
        if self.aa {
            octets[2] |= AA_MASK;
        }
        if self.tc {
            octets[2] |= TC_MASK;
        }
        if self.rd {
            octets[2] |= RD_MASK;
        }
        octets[3] = ((self.z << Z_SHIFT) & Z_MASK) | (u8::from(self.rcode) & RCODE_MASK);
        if self.ra {
            octets[3] |= RA_MASK;
        }
        octets[4..6].copy_from_slice(&self.qdcount.to_be_bytes());
        octets[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        octets[8..10].copy_from_slice(&self.nscount.to_be_bytes());
        octets[10..12].copy_from_slice(&self.arcount.to_be_bytes());
        octets
    }

    /// Returns a header for a standard query (QUERY opcode, RD set)
    /// with the given ID and all counts zero.
    pub fn query(id: u16) -> Self {
        Self {
            id,
            qr: false,
            opcode: Opcode::Query,
            aa: false,
            tc: false,
            rd: true,
            ra: false,
            z: 0,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }
}

/// Summarizes the header on one line, for diagnostics.
impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id={} {} {}",
            self.id,
            if self.qr { "RESPONSE" } else { "QUERY" },
            self.opcode,
        )?;
        for (set, name) in [
            (self.aa, " AUTHORITATIVE"),
            (self.tc, " TRUNCATED"),
            (self.rd, " RD"),
            (self.ra, " RA"),
        ] {
            if set {
                f.write_str(name)?;
            }
        }
        write!(
            f,
            " z={} {} QD({}) AN({}) NS({}) AR({})",
            self.z, self.rcode, self.qdcount, self.ancount, self.nscount, self.arcount
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_works() {
        let octets = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00junk";
        let (header, consumed) = Header::decode(octets).unwrap();
        assert_eq!(consumed, HEADER_SIZE);
        assert_eq!(header.id, 0x1234);
        assert!(!header.qr);
        assert_eq!(header.opcode, Opcode::Query);
        assert!(header.rd);
        assert!(!header.aa && !header.tc && !header.ra);
        assert_eq!(header.rcode, Rcode::NoError);
        assert_eq!(header.qdcount, 1);
        assert_eq!(header.ancount + header.nscount + header.arcount, 0);
    }

    #[test]
    fn decode_rejects_short_headers() {
        for size in 0..HEADER_SIZE {
            let buf = vec![0; size];
            assert_eq!(Header::decode(&buf), Err(Error::HeaderTooShort));
        }
    }

    #[test]
    fn encode_reverses_decode() {
        let samples: [&[u8; 12]; 4] = [
            b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00",
            b"\xe2\xd7\x81\x80\x00\x01\x00\x02\x00\x00\x00\x01",
            b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\xff\xff\xff",
            b"\x00\x00\x1a\x7b\x00\x00\x00\x00\x00\x00\x00\x00",
        ];
        for sample in samples {
            let (header, _) = Header::decode(sample).unwrap();
            assert_eq!(&header.encode(), sample);
        }
    }

    #[test]
    fn encode_reverses_decode_for_all_flag_octets() {
        let mut octets = [0u8; HEADER_SIZE];
        for flags in 0..=u16::MAX {
            octets[2..4].copy_from_slice(&flags.to_be_bytes());
            let (header, _) = Header::decode(&octets).unwrap();
            assert_eq!(header.encode(), octets);
        }
    }

    #[test]
    fn display_summarizes_the_header() {
        let (header, _) =
            Header::decode(b"\x12\x34\x81\x80\x00\x01\x00\x02\x00\x00\x00\x01").unwrap();
        assert_eq!(
            header.to_string(),
            "id=4660 RESPONSE QUERY RD RA z=0 NOERROR QD(1) AN(2) NS(0) AR(1)"
        );
    }
}
