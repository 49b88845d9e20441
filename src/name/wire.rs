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

//! Implementation of parsing of compressed on-the-wire names.

use super::{Error, Name, NameBuilder, MAX_POINTER_HOPS};

/// Parses a compressed name starting at index `start` of `octets`.
/// Pointers are followed. Indices given in pointers are treated as
/// indices of `octets`, so the intention is for an entire DNS message
/// to be passed in `octets`. This is the implementation of
/// [`Name::try_from_compressed`].
///
/// Pointers may point forward as well as backward. Loops are caught
/// by bounding the number of pointers followed to
/// [`MAX_POINTER_HOPS`]; a loop that also adds labels trips the name
/// length limit first.
pub fn parse_compressed_name(octets: &[u8], start: usize) -> Result<(Name, usize), Error> {
    let mut builder = NameBuilder::new();
    let mut index = start;
    let mut consumed = None;
    let mut hops = 0;

    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        match len & 0xc0 {
            0xc0 => {
                let pointer = parse_pointer(octets, index)?;
                // Only the first pointer counts toward the space the
                // name occupies at its original position.
                consumed.get_or_insert(index + 2 - start);
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::PointerLoop);
                }
                index = pointer;
            }
            0x00 if len == 0 => {
                let consumed = consumed.unwrap_or_else(|| index + 1 - start);
                return Ok((builder.finish()?, consumed));
            }
            0x00 => {
                let label_start = index + 1;
                let label_end = label_start + len as usize;
                let label = octets
                    .get(label_start..label_end)
                    .ok_or(Error::UnexpectedEom)?;
                builder.push_label(label)?;
                index = label_end;
            }
            _ => return Err(Error::ReservedLabelType),
        }
    }
}

/// Reads the compression pointer at `index` and returns its target.
fn parse_pointer(octets: &[u8], index: usize) -> Result<usize, Error> {
    let high = octets[index];
    let low = *octets.get(index + 1).ok_or(Error::UnexpectedEom)?;
    let target = (u16::from_be_bytes([high, low]) & 0x3fff) as usize;
    if target >= octets.len() {
        Err(Error::InvalidPointer)
    } else {
        Ok(target)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_of(name: &Name) -> Vec<&[u8]> {
        name.labels().collect()
    }

    #[test]
    fn parse_compressed_name_accepts_valid_uncompressed_names() {
        let octets = b"junk\x07example\x04test\x00junk";
        let (name, len) = parse_compressed_name(octets, 4).unwrap();
        assert_eq!(name.wire_repr(), b"\x07example\x04test\x00");
        assert_eq!(len, 14);
    }

    #[test]
    fn parse_compressed_name_accepts_valid_compressed_names() {
        let octets = b"junk\x04test\x00junk\x07example\xc0\x04junk";
        let (name, len) = parse_compressed_name(octets, 14).unwrap();
        assert_eq!(name.wire_repr(), b"\x07example\x04test\x00");
        assert_eq!(len, 10);
    }

    #[test]
    fn parse_compressed_name_follows_backward_pointers_into_earlier_names() {
        let octets = b"\x03256\x02bz\x00junk\x03abc\xc0\x00";
        let (name, len) = parse_compressed_name(octets, 12).unwrap();
        assert_eq!(labels_of(&name), [&b"abc"[..], b"256", b"bz"]);
        assert_eq!(len, 6);
    }

    #[test]
    fn parse_compressed_name_reports_two_octets_for_a_bare_pointer() {
        let octets = b"\x03www\x07example\x03com\x00\xc0\x00";
        let (name, len) = parse_compressed_name(octets, 17).unwrap();
        assert_eq!(labels_of(&name), [&b"www"[..], b"example", b"com"]);
        assert_eq!(len, 2);
    }

    #[test]
    fn parse_compressed_name_accepts_forward_pointers() {
        let (name, len) = parse_compressed_name(b"\x01x\xc0\x08junk\x00", 0).unwrap();
        assert_eq!(name.wire_repr(), b"\x01x\x00");
        assert_eq!(len, 4);
    }

    #[test]
    fn parse_compressed_name_accepts_root() {
        let (name, len) = parse_compressed_name(b"\x00", 0).unwrap();
        assert!(name.is_root());
        assert_eq!(len, 1);
    }

    #[test]
    fn parse_compressed_name_rejects_reserved_label_types() {
        assert_eq!(
            parse_compressed_name(b"\x40abc\x00", 0).unwrap_err(),
            Error::ReservedLabelType
        );
        assert_eq!(
            parse_compressed_name(b"\x80abc\x00", 0).unwrap_err(),
            Error::ReservedLabelType
        );
    }

    #[test]
    fn parse_compressed_name_rejects_long_name() {
        let mut octets = Vec::new();
        for _ in 0..128 {
            octets.extend_from_slice(b"\x01x");
        }
        octets.push(0);
        assert_eq!(
            parse_compressed_name(&octets, 0).unwrap_err(),
            Error::NameTooLong
        );
    }

    #[test]
    fn parse_compressed_name_rejects_long_name_with_pointers() {
        // 100 labels, then a pointer back to the start: the name would
        // be 401 octets long.
        let mut octets = Vec::new();
        for _ in 0..100 {
            octets.extend_from_slice(b"\x01x");
        }
        octets.extend_from_slice(b"\xc0\x00");
        assert_eq!(
            parse_compressed_name(&octets, 0).unwrap_err(),
            Error::NameTooLong
        );
    }

    #[test]
    fn parse_compressed_name_rejects_unexpected_eom() {
        assert_eq!(
            parse_compressed_name(b"\x07example\x04tes", 0).unwrap_err(),
            Error::UnexpectedEom
        );
        assert_eq!(
            parse_compressed_name(b"\x07example\x04test", 0).unwrap_err(),
            Error::UnexpectedEom
        );
        assert_eq!(
            parse_compressed_name(b"\x07example\xc0", 0).unwrap_err(),
            Error::UnexpectedEom
        );
    }

    #[test]
    fn parse_compressed_name_rejects_out_of_bounds_pointers() {
        assert_eq!(
            parse_compressed_name(b"\x01a\xc0\x10", 0).unwrap_err(),
            Error::InvalidPointer
        );
    }

    #[test]
    fn parse_compressed_name_rejects_pointer_loops() {
        assert_eq!(
            parse_compressed_name(b"\xc0\x00", 0).unwrap_err(),
            Error::PointerLoop
        );
        assert_eq!(
            parse_compressed_name(b"\xc0\x02\xc0\x00", 0).unwrap_err(),
            Error::PointerLoop
        );
    }

    #[test]
    fn parse_compressed_name_round_trips_built_names() {
        let original = Name::from_labels(["abc", "$", "256", "bz"]).unwrap();
        let mut octets = b"\x00\x00".to_vec();
        octets.extend_from_slice(original.wire_repr());
        let (parsed, len) = parse_compressed_name(&octets, 2).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(len, original.wire_len());
    }
}
