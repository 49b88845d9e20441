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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use super::header::HEADER_SIZE;
use super::{Header, Opcode, Question, ResourceRecord};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer that serializes a DNS message into it.
///
/// A `Writer` is constructed using [`Writer::new`] (to set a message
/// size limit different from the underlying buffer size) or with its
/// [`TryFrom`] implementation (which sets the limit equal to the buffer
/// length). The buffer and limit must be long enough to accommodate a
/// full DNS message header of 12 octets.
///
/// Questions and resource records are written sequentially based on a
/// cursor, so they must be added in message order (questions, answer
/// RRs, authority RRs, additional RRs). Attempts to add them out of
/// order fail with [`Error::OutOfOrder`]. Names are always written
/// uncompressed. The header, including the section counts, is written
/// by [`Writer::finish`].
///
/// The gateway itself never sends DNS messages; the `Writer` exists to
/// build tunnel queries (e.g. in tests and client tooling).
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    section: Section,
    header: Header,
}

/// A type for recording which section of a DNS message a [`Writer`] is
/// currently serializing.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl<'a> Writer<'a> {
    /// Creates a new `Writer` from the underlying buffer `octets`. The
    /// message size is limited to `limit` or `octets.len()` (whichever
    /// is smaller). If the smaller limit is too small to hold a full
    /// DNS message header of 12 octets, then this will fail.
    pub fn new(octets: &'a mut [u8], limit: usize) -> Result<Self> {
        let limit = limit.min(octets.len());
        if limit < HEADER_SIZE {
            Err(Error::Truncation)
        } else {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
                limit,
                section: Section::Question,
                header: Header::query(0),
            })
        }
    }

    /// Sets the message ID.
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    /// Sets the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.header.qr = qr;
    }

    /// Sets the opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.header.opcode = opcode;
    }

    /// Sets the RD (recursion desired) bit. It is set initially.
    pub fn set_rd(&mut self, rd: bool) {
        self.header.rd = rd;
    }

    /// Adds a question to the message.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        self.enter_section(Section::Question)?;
        let count = increment(self.header.qdcount)?;
        self.write_atomically(|this| {
            this.try_push(question.qname.wire_repr())?;
            this.try_push(&u16::from(question.qtype).to_be_bytes())?;
            this.try_push(&u16::from(question.qclass).to_be_bytes())
        })?;
        self.header.qdcount = count;
        Ok(())
    }

    /// Adds a resource record to the answer section.
    pub fn add_answer_rr(&mut self, rr: &ResourceRecord) -> Result<()> {
        self.enter_section(Section::Answer)?;
        let count = increment(self.header.ancount)?;
        self.add_rr(rr)?;
        self.header.ancount = count;
        Ok(())
    }

    /// Adds a resource record to the authority section.
    pub fn add_authority_rr(&mut self, rr: &ResourceRecord) -> Result<()> {
        self.enter_section(Section::Authority)?;
        let count = increment(self.header.nscount)?;
        self.add_rr(rr)?;
        self.header.nscount = count;
        Ok(())
    }

    /// Adds a resource record to the additional section.
    pub fn add_additional_rr(&mut self, rr: &ResourceRecord) -> Result<()> {
        self.enter_section(Section::Additional)?;
        let count = increment(self.header.arcount)?;
        self.add_rr(rr)?;
        self.header.arcount = count;
        Ok(())
    }

    /// Writes the header and returns the length of the message.
    pub fn finish(self) -> usize {
        self.octets[..HEADER_SIZE].copy_from_slice(&self.header.encode());
        self.cursor
    }

    fn add_rr(&mut self, rr: &ResourceRecord) -> Result<()> {
        let rdlength = u16::try_from(rr.rdata.len()).or(Err(Error::RdataTooLong))?;
        self.write_atomically(|this| {
            this.try_push(rr.owner.wire_repr())?;
            this.try_push(&u16::from(rr.rr_type).to_be_bytes())?;
            this.try_push(&u16::from(rr.class).to_be_bytes())?;
            this.try_push(&u32::from(rr.ttl).to_be_bytes())?;
            this.try_push(&rdlength.to_be_bytes())?;
            this.try_push(rr.rdata)
        })
    }

    fn enter_section(&mut self, section: Section) -> Result<()> {
        if section < self.section {
            Err(Error::OutOfOrder)
        } else {
            self.section = section;
            Ok(())
        }
    }

    /// Runs `f`, rewinding the cursor if it fails.
    fn write_atomically(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let start = self.cursor;
        f(self).map_err(|err| {
            self.cursor = start;
            err
        })
    }

    fn try_push(&mut self, data: &[u8]) -> Result<()> {
        let end = self.cursor + data.len();
        if end > self.limit {
            Err(Error::Truncation)
        } else {
            self.octets[self.cursor..end].copy_from_slice(data);
            self.cursor = end;
            Ok(())
        }
    }
}

impl<'a> TryFrom<&'a mut [u8]> for Writer<'a> {
    type Error = Error;

    fn try_from(octets: &'a mut [u8]) -> Result<Self> {
        let limit = octets.len();
        Self::new(octets, limit)
    }
}

fn increment(count: u16) -> Result<u16> {
    count.checked_add(1).ok_or(Error::CountOverflow)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Writer`] operation failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Adding the question or resource record would overflow the
    /// corresponding 16-bit counter in the DNS header.
    CountOverflow,

    /// There is not enough room left in the buffer.
    Truncation,

    /// An attempt was made to serialize a question or resource record
    /// in the wrong place in the message (e.g., adding a question after
    /// an answer resource record has already been serialized).
    OutOfOrder,

    /// The RDATA of a record is longer than 65,535 octets.
    RdataTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("section count overflow"),
            Self::Truncation => f.write_str("message truncated"),
            Self::OutOfOrder => f.write_str("question or RR written out of order"),
            Self::RdataTooLong => f.write_str("RDATA is too long"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::{Qclass, Qtype, Reader};
    use super::*;
    use crate::class::Class;
    use crate::rr::{Ttl, Type};

    fn tunnel_question() -> Question {
        Question {
            qname: "abc.$.256.bz.".parse().unwrap(),
            qtype: Qtype::TXT,
            qclass: Qclass::IN,
        }
    }

    #[test]
    fn writer_builds_tunnel_queries() {
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        writer.set_id(0x1234);
        writer.set_rd(false);
        writer.add_question(&tunnel_question()).unwrap();
        let len = writer.finish();

        let expected: &[u8] = b"\x12\x34\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                                \x03abc\x01$\x03256\x02bz\x00\x00\x10\x00\x01";
        assert_eq!(&buf[..len], expected);
    }

    #[test]
    fn writer_output_is_readable() {
        let rr = ResourceRecord {
            owner: "a.example.".parse().unwrap(),
            rr_type: Type::A,
            class: Class::IN,
            ttl: Ttl::from(60),
            rdata: &[192, 0, 2, 1],
        };
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        writer.add_question(&tunnel_question()).unwrap();
        writer.add_answer_rr(&rr).unwrap();
        writer.add_additional_rr(&rr).unwrap();
        let len = writer.finish();

        let mut reader = Reader::try_from(&buf[..len]).unwrap();
        assert_eq!(reader.header().qdcount, 1);
        assert_eq!(reader.header().ancount, 1);
        assert_eq!(reader.header().nscount, 0);
        assert_eq!(reader.header().arcount, 1);
        assert_eq!(reader.read_question().unwrap(), tunnel_question());
        assert_eq!(reader.read_rr().unwrap(), rr);
        assert_eq!(reader.read_rr().unwrap(), rr);
        assert!(reader.at_eom());
    }

    #[test]
    fn writer_rejects_out_of_order_additions() {
        let rr = ResourceRecord {
            owner: "example.".parse().unwrap(),
            rr_type: Type::TXT,
            class: Class::IN,
            ttl: Ttl::from(0),
            rdata: b"\x00",
        };
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        writer.add_authority_rr(&rr).unwrap();
        assert_eq!(writer.add_answer_rr(&rr), Err(Error::OutOfOrder));
        assert_eq!(writer.add_question(&tunnel_question()), Err(Error::OutOfOrder));
    }

    #[test]
    fn writer_truncation_leaves_message_intact() {
        let mut buf = [0; 30];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        writer.add_question(&tunnel_question()).unwrap();
        assert_eq!(
            writer.add_question(&tunnel_question()),
            Err(Error::Truncation)
        );
        assert_eq!(writer.finish(), 30);
        assert_eq!(&buf[4..6], b"\x00\x01");
    }

    #[test]
    fn writer_rejects_tiny_buffers() {
        let mut buf = [0; 11];
        assert!(Writer::try_from(&mut buf[..]).is_err());
    }
}
