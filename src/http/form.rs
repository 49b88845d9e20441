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

//! Percent-encoding of forms and path segments.
//!
//! Forms use the `application/x-www-form-urlencoded` serialization of
//! the [URL Standard]: a space becomes `+`, the octets `A-Z`, `a-z`,
//! `0-9`, `*`, `-`, `.`, and `_` are kept, and every other octet is
//! written as `%XX`.
//!
//! [URL Standard]: https://url.spec.whatwg.org/#application/x-www-form-urlencoded

use std::collections::BTreeMap;

use super::Error;
use crate::util::{ascii_hex_digit_to_nibble, nibble_to_ascii_hex_digit};

/// A form, with names kept in sorted order.
pub type Form = BTreeMap<String, String>;

/// Serializes a form as `name=value` pairs joined by `&`.
pub fn encode(form: &Form) -> String {
    let mut out = String::new();
    for (name, value) in form {
        if !out.is_empty() {
            out.push('&');
        }
        encode_component_into(name, &mut out);
        out.push('=');
        encode_component_into(value, &mut out);
    }
    out
}

/// Parses `application/x-www-form-urlencoded` text. Pairs without an
/// `=` get an empty value; empty pairs are skipped. When a name repeats,
/// the last value wins.
pub fn decode(text: &str) -> Result<Form, Error> {
    let mut form = Form::new();
    for pair in text.split('&').filter(|pair| !pair.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        form.insert(decode_component(name)?, decode_component(value)?);
    }
    Ok(form)
}

/// Percent-encodes a single path segment, keeping only the unreserved
/// characters of RFC 3986 § 2.3.
pub fn encode_path_segment(segment: &[u8]) -> String {
    let mut out = String::with_capacity(segment.len());
    for &octet in segment {
        if octet.is_ascii_alphanumeric() || matches!(octet, b'-' | b'.' | b'_' | b'~') {
            out.push(octet as char);
        } else {
            push_percent_encoded(octet, &mut out);
        }
    }
    out
}

fn encode_component_into(component: &str, out: &mut String) {
    for &octet in component.as_bytes() {
        if octet == b' ' {
            out.push('+');
        } else if octet.is_ascii_alphanumeric() || matches!(octet, b'*' | b'-' | b'.' | b'_') {
            out.push(octet as char);
        } else {
            push_percent_encoded(octet, out);
        }
    }
}

fn push_percent_encoded(octet: u8, out: &mut String) {
    out.push('%');
    out.push(nibble_to_ascii_hex_digit(octet >> 4) as char);
    out.push(nibble_to_ascii_hex_digit(octet & 0xf) as char);
}

fn decode_component(component: &str) -> Result<String, Error> {
    let mut octets = Vec::with_capacity(component.len());
    let mut remaining = component.as_bytes();
    while let Some((&octet, rest)) = remaining.split_first() {
        match octet {
            b'+' => {
                octets.push(b' ');
                remaining = rest;
            }
            b'%' => {
                let high = rest.first().copied().and_then(ascii_hex_digit_to_nibble);
                let low = rest.get(1).copied().and_then(ascii_hex_digit_to_nibble);
                match (high, low) {
                    (Some(high), Some(low)) => octets.push(high << 4 | low),
                    _ => return Err(Error::InvalidForm),
                }
                remaining = &rest[2..];
            }
            _ => {
                octets.push(octet);
                remaining = rest;
            }
        }
    }
    String::from_utf8(octets).or(Err(Error::InvalidForm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_follows_the_form_rules() {
        let mut form = Form::new();
        form.insert("q".into(), "hello world".into());
        form.insert("a*b".into(), "x/y&z=1~".into());
        assert_eq!(encode(&form), "a*b=x%2Fy%26z%3D1%7E&q=hello+world");
        assert_eq!(encode(&Form::new()), "");
    }

    #[test]
    fn decode_reverses_encode() {
        let mut form = Form::new();
        form.insert("q".into(), "ünïcödé + spaces".into());
        form.insert("empty".into(), String::new());
        assert_eq!(decode(&encode(&form)), Ok(form));
    }

    #[test]
    fn decode_handles_odd_input() {
        let form = decode("a=1&&b&c=%41%62+").unwrap();
        assert_eq!(form["a"], "1");
        assert_eq!(form["b"], "");
        assert_eq!(form["c"], "Ab ");
        assert_eq!(decode("a=%4"), Err(Error::InvalidForm));
        assert_eq!(decode("a=%zz"), Err(Error::InvalidForm));
        assert_eq!(decode("a=%ff"), Err(Error::InvalidForm));
    }

    #[test]
    fn path_segments_are_escaped() {
        assert_eq!(encode_path_segment(b"v1"), "v1");
        assert_eq!(encode_path_segment(b"a b/c?"), "a%20b%2Fc%3F");
    }
}
