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

//! Implementation of data structures related to domain names.

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod builder;
mod error;
mod wire;
pub(crate) use builder::NameBuilder;
pub use error::Error;

/// The maximum number of labels in a domain name, including the null
/// label.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
pub const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum number of compression pointers followed while decoding
/// a single name. A legitimate name has at most 127 non-null labels,
/// so a longer chain can only be a loop.
pub const MAX_POINTER_HOPS: usize = 128;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name.
///
/// A `Name` owns the uncompressed on-the-wire representation of the
/// name ([RFC 1035 § 3.1]) along with the offset of each label within
/// it. Both live in fixed-capacity inline buffers, since a name is
/// never longer than 255 octets. `Name`s can be constructed
///
/// * through the [`FromStr`] implementation;
/// * from a list of labels with [`Name::from_labels`]; and
/// * from compressed on-the-wire names in a DNS message with
///   [`Name::try_from_compressed`].
///
/// Every constructor enforces the label and name length limits, so a
/// `Name` is always valid.
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    wire_repr: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
}

////////////////////////////////////////////////////////////////////////
// NAME PUBLIC API                                                    //
////////////////////////////////////////////////////////////////////////

impl Name {
    /// Returns a `Name` representing the DNS root, `.`.
    pub fn root() -> Self {
        let mut wire_repr = ArrayVec::new();
        wire_repr.push(0);
        let mut label_offsets = ArrayVec::new();
        label_offsets.push(0);
        Self {
            wire_repr,
            label_offsets,
        }
    }

    /// Builds a `Name` from its non-null labels, given from left to
    /// right. The null label is appended automatically.
    pub fn from_labels<I, L>(labels: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut builder = NameBuilder::new();
        for label in labels {
            builder.push_label(label.as_ref())?;
        }
        builder.finish()
    }

    /// Decodes a possibly compressed name that starts at `start` within
    /// the DNS message `message`. On success, this returns the name and
    /// the number of octets it occupies at `start` (which is two if the
    /// name begins with a compression pointer).
    pub fn try_from_compressed(message: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed_name(message, start)
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.relative_to(other).is_some()
    }

    /// If this `Name` is equal to or a subdomain of `domain`, returns
    /// the labels that precede `domain` (which may be none).
    pub fn relative_to(&self, domain: &Name) -> Option<Labels> {
        let n = self.len();
        let m = domain.len();
        if m > n {
            return None;
        }
        let prefix = n - m;
        if self
            .labels()
            .skip(prefix)
            .zip(domain.labels())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
        {
            Some(Labels {
                name: self,
                front: 0,
                back: prefix,
            })
        } else {
            None
        }
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the non-null labels of this `Name`,
    /// from left to right.
    pub fn labels(&self) -> Labels {
        Labels {
            name: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Returns the number of non-null labels in this `Name`.
    pub fn len(&self) -> usize {
        self.label_offsets.len() - 1
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire_repr
    }

    /// Returns the length of the `Name`'s uncompressed on-the-wire
    /// representation.
    pub fn wire_len(&self) -> usize {
        self.wire_repr.len()
    }

    /// Returns the length of the expanded name: the total length of
    /// its labels plus one separator between each pair of them. The
    /// root name has an expanded length of zero.
    pub fn expanded_len(&self) -> usize {
        self.wire_len().saturating_sub(2)
    }

    /// Returns the label at index `n`.
    fn label(&self, n: usize) -> &[u8] {
        let offset = self.label_offsets[n] as usize;
        let len = self.wire_repr[offset] as usize;
        &self.wire_repr[offset + 1..offset + 1 + len]
    }
}

/// Displays the name in presentation format with a trailing dot.
/// Special characters within labels are escaped per [RFC 4343 § 2.1].
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            write!(f, "{}.", LabelDisplay(label))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// In accordance with RFC 1034 § 3.1 (clarified by RFC 4343),
/// comparison of `Name`s is ASCII-case-insensitive.
impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire_repr.eq_ignore_ascii_case(&other.wire_repr)
    }
}

impl Eq for Name {}

////////////////////////////////////////////////////////////////////////
// LABELS                                                             //
////////////////////////////////////////////////////////////////////////

/// Displays a single label in presentation format, escaping `.`, `\`,
/// and non-printable octets.
#[derive(Clone, Copy)]
pub struct LabelDisplay<'a>(pub &'a [u8]);

impl fmt::Display for LabelDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for octet in self.0 {
            if *octet == b'.' {
                f.write_str("\\.")?;
            } else if *octet == b'\\' {
                f.write_str("\\\\")?;
            } else if octet.is_ascii_graphic() {
                write!(f, "{}", *octet as char)?;
            } else {
                write!(f, "\\{:03}", *octet)?;
            }
        }
        Ok(())
    }
}

/// An iterator over (some of) the labels of a [`Name`], as octet
/// slices. Obtained through [`Name::labels`] or [`Name::relative_to`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.front += 1;
            Some(self.name.label(self.front - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(self.name.label(self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII. Escape sequences as defined by
/// [RFC 4343 § 2.1] are supported. A missing trailing dot is implied,
/// so `example.com` and `example.com.` are the same name.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut builder = NameBuilder::new();

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                builder.try_push(value)?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                builder.next_label()?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                builder.try_push(octet)?;
                remaining_octets = &remaining_octets[1..];
            }
        }
        builder.finish()
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value =
                100 * (a - b'0') as usize + 10 * (b - b'0') as usize + (c - b'0') as usize;
            u8::try_from(value)
                .map(|value| (value, 3))
                .or(Err(Error::InvalidEscape))
        }
        [first, ..] if first.is_ascii_digit() => Err(Error::InvalidEscape),
        [first, ..] => Ok((*first, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_works() {
        let name: Name = "www.Example.com.".parse().unwrap();
        assert_eq!(name.wire_repr(), b"\x03www\x07Example\x03com\x00");
        assert_eq!(name.len(), 3);
        assert_eq!(name.to_string(), "www.Example.com.");
    }

    #[test]
    fn from_str_implies_trailing_dot() {
        let relative: Name = "256.bz".parse().unwrap();
        let absolute: Name = "256.bz.".parse().unwrap();
        assert_eq!(relative, absolute);
    }

    #[test]
    fn from_str_handles_escapes() {
        let name: Name = "a\\.b\\092\\000.c".parse().unwrap();
        assert_eq!(name.wire_repr(), b"\x05a.b\\\x00\x01c\x00");
        assert_eq!(name.to_string(), "a\\.b\\\\\\000.c.");
    }

    #[test]
    fn from_str_rejects_bad_input() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
        assert_eq!("a..b".parse::<Name>(), Err(Error::NullNonTerminal));
        assert_eq!("a\\25".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("a\\256".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("a\\".parse::<Name>(), Err(Error::InvalidEscape));
        assert_eq!("é.com".parse::<Name>(), Err(Error::StrNotAscii));
    }

    #[test]
    fn root_works() {
        let root = Name::root();
        assert!(root.is_root());
        assert_eq!(root.wire_repr(), b"\x00");
        assert_eq!(root.expanded_len(), 0);
        assert_eq!(root.to_string(), ".");
        assert_eq!(".".parse::<Name>().unwrap(), root);
    }

    #[test]
    fn expanded_len_counts_labels_and_separators() {
        let name: Name = "abc.$.256.bz.".parse().unwrap();
        assert_eq!(name.expanded_len(), "abc.$.256.bz".len());
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let a: Name = "EXAMPLE.com.".parse().unwrap();
        let b: Name = "example.COM.".parse().unwrap();
        let c: Name = "example.org.".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn relative_to_works() {
        let domain: Name = "256.BZ.".parse().unwrap();
        let name: Name = "abc.$.256.bz.".parse().unwrap();
        let relative: Vec<&[u8]> = name.relative_to(&domain).unwrap().collect();
        assert_eq!(relative, [&b"abc"[..], b"$"]);
        assert_eq!(domain.relative_to(&domain).unwrap().count(), 0);
        assert!(name.eq_or_subdomain_of(&domain));
        assert!(!domain.eq_or_subdomain_of(&name));

        let other: Name = "abc.256.bz.example.".parse().unwrap();
        assert!(other.relative_to(&domain).is_none());
    }

    #[test]
    fn from_labels_works() {
        let name = Name::from_labels(["hello", "example", "com"]).unwrap();
        assert_eq!(name, "hello.example.com.".parse().unwrap());
        let labels: Vec<&[u8]> = name.labels().rev().collect();
        assert_eq!(labels, [&b"com"[..], b"example", b"hello"]);
        assert_eq!(
            Name::from_labels(["ok", ""]).unwrap_err(),
            Error::NullNonTerminal
        );
    }
}
