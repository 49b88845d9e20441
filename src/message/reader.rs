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

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages.

use std::fmt;

use super::{Header, Question, ResourceRecord};
use crate::name;

////////////////////////////////////////////////////////////////////////
// DECODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Decoding of a message body element (a question or a resource
/// record) at a given offset of a whole DNS message.
///
/// The whole message is passed so that compression pointers can be
/// followed. On success, the element is returned along with the offset
/// of the first octet after it.
pub trait Decode<'a>: Sized {
    fn decode(octets: &'a [u8], offset: usize) -> Result<(Self, usize)>;
}

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation,
/// which decodes the [`Header`]; construction fails if the buffer is
/// shorter than the 12-octet header. For reading questions and RRs,
/// the [`Reader::read_question`] and [`Reader::read_rr`] methods are
/// provided. These read using a cursor, which is initially set to the
/// first octet after the DNS header. They must be called sequentially
/// to read any questions, and then any records, in the order they
/// appear in the message.
#[derive(Debug, Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    header: Header,
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Returns the message's decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reads a [`Question`] starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        self.read()
    }

    /// Reads a resource record at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<ResourceRecord<'a>> {
        self.read()
    }

    /// Returns whether the `Reader`'s cursor has reached the end of the
    /// message.
    pub fn at_eom(&self) -> bool {
        self.cursor >= self.octets.len()
    }

    /// Returns the current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn read<T: Decode<'a>>(&mut self) -> Result<T> {
        let (element, next) = T::decode(self.octets, self.cursor)?;
        self.cursor = next;
        Ok(element)
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        let (header, cursor) = Header::decode(octets)?;
        Ok(Self {
            octets,
            header,
            cursor,
        })
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS FOR READING MULTI-BYTE INTEGERS                            //
////////////////////////////////////////////////////////////////////////

/// Reads a network-byte-order `u16` at index `at` of `octets`.
pub(super) fn read_u16(octets: &[u8], at: usize) -> Result<u16> {
    match octets.get(at..at + 2) {
        Some(&[a, b]) => Ok(u16::from_be_bytes([a, b])),
        _ => Err(Error::UnexpectedEomInField),
    }
}

/// Reads a network-byte-order `u32` at index `at` of `octets`.
pub(super) fn read_u32(octets: &[u8], at: usize) -> Result<u32> {
    match octets.get(at..at + 4) {
        Some(&[a, b, c, d]) => Ok(u32::from_be_bytes([a, b, c, d])),
        _ => Err(Error::UnexpectedEomInField),
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a header, [`Question`], or resource record
/// could not be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    UnexpectedEomInRdata,
    InvalidOwner(name::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("header too short"),
            Self::UnexpectedEomInField => f.write_str("unexpected end of message in field"),
            Self::UnexpectedEomInRdata => f.write_str("unexpected end of message in RDATA"),
            Self::InvalidOwner(err) => write!(f, "invalid owner: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidOwner(err) => Some(err),
            _ => None,
        }
    }
}

/// The type returned by fallible [`Reader`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::{Opcode, Qclass, Qtype, Rcode};
    use super::*;
    use crate::class::Class;
    use crate::name::Name;
    use crate::rr::{Ttl, Type};

    /// This is a reply to a query for example.com. IN NS to a recursive
    /// server, made on January 7, 2022.
    const EXAMPLE_COM_NS_MESSAGE: &[u8] =
        b"\xe2\xd7\x81\x80\x00\x01\x00\x02\x00\x00\x00\x01\x07\x65\x78\x61\
          \x6d\x70\x6c\x65\x03\x63\x6f\x6d\x00\x00\x02\x00\x01\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x14\x01\x61\x0c\x69\x61\x6e\x61\
          \x2d\x73\x65\x72\x76\x65\x72\x73\x03\x6e\x65\x74\x00\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x04\x01\x62\xc0\x2b\x00\x00\x29\
          \x10\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn reader_works() {
        let mut reader = Reader::try_from(EXAMPLE_COM_NS_MESSAGE).unwrap();
        let expected_qname: Name = "example.com.".parse().unwrap();

        // Check the header.
        let header = *reader.header();
        assert_eq!(header.id, 0xe2d7);
        assert!(header.qr);
        assert_eq!(header.opcode, Opcode::Query);
        assert!(!header.aa);
        assert!(!header.tc);
        assert!(header.rd);
        assert!(header.ra);
        assert_eq!(header.rcode, Rcode::NoError);
        assert_eq!(header.qdcount, 1);
        assert_eq!(header.ancount, 2);
        assert_eq!(header.nscount, 0);
        assert_eq!(header.arcount, 1);

        // Check the question.
        let question = reader.read_question().unwrap();
        assert_eq!(question.qname, expected_qname);
        assert_eq!(question.qtype, Qtype::from(Type::NS));
        assert_eq!(question.qclass, Qclass::IN);

        // Check the answers. The RDATA holds compressed names, which
        // are passed through untouched.
        let answer_1 = reader.read_rr().unwrap();
        assert_eq!(answer_1.owner, expected_qname);
        assert_eq!(answer_1.rr_type, Type::NS);
        assert_eq!(answer_1.class, Class::IN);
        assert_eq!(answer_1.ttl, Ttl::from(86178));
        assert_eq!(answer_1.rdata, b"\x01a\x0ciana-servers\x03net\x00");
        let answer_2 = reader.read_rr().unwrap();
        assert_eq!(answer_2.owner, expected_qname);
        assert_eq!(answer_2.rdata, b"\x01b\xc0\x2b");

        // Check the OPT record.
        let opt = reader.read_rr().unwrap();
        assert!(opt.owner.is_root());
        assert_eq!(opt.rr_type, Type::OPT);
        assert_eq!(opt.class, Class::from(4096));
        assert!(opt.rdata.is_empty());

        // And that should be it!
        assert!(reader.at_eom());
    }

    #[test]
    fn reader_constructor_rejects_short_message() {
        for size in 0..12 {
            let buf = vec![0; size];
            assert_eq!(Reader::try_from(buf.as_slice()), Err(Error::HeaderTooShort));
        }
    }

    #[test]
    fn reader_is_atomic_on_failure() {
        let message = b"\x00\x00\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x03abc\xc0";
        let mut reader = Reader::try_from(&message[..]).unwrap();
        assert_eq!(
            reader.read_question(),
            Err(Error::InvalidOwner(name::Error::UnexpectedEom))
        );
        assert_eq!(reader.cursor(), 12);
        assert!(!reader.at_eom());
    }

    #[test]
    fn reader_rejects_pointer_loops() {
        let message = b"\x00\x00\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\xc0\x0e\xc0\x0c\x00\x10\x00\x01";
        let mut reader = Reader::try_from(&message[..]).unwrap();
        assert_eq!(
            reader.read_question(),
            Err(Error::InvalidOwner(name::Error::PointerLoop))
        );
    }

    /// Reads everything a message claims to hold, stopping at the
    /// first error.
    fn read_everything(octets: &[u8]) {
        let mut reader = match Reader::try_from(octets) {
            Ok(reader) => reader,
            Err(_) => return,
        };
        let header = *reader.header();
        for _ in 0..header.qdcount {
            if reader.read_question().is_err() {
                return;
            }
        }
        let n_records = header.ancount as usize + header.nscount as usize + header.arcount as usize;
        for _ in 0..n_records {
            let before = reader.cursor();
            match reader.read_rr() {
                Ok(_) => assert!(reader.cursor() > before),
                Err(_) => {
                    assert_eq!(reader.cursor(), before);
                    return;
                }
            }
        }
    }

    #[test]
    fn reader_survives_mutated_and_truncated_messages() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5353);
        for _ in 0..20_000 {
            let mut message = EXAMPLE_COM_NS_MESSAGE.to_vec();
            for _ in 0..rng.gen_range(1..=4) {
                let index = rng.gen_range(0..message.len());
                message[index] = rng.gen();
            }
            let len = rng.gen_range(0..=message.len());
            read_everything(&message[..len]);
        }
    }
}
