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

//! Implementation of the default [`LabelMapping`].

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::{Error, RequestMapping};
use crate::http::form::{self, Form};
use crate::http::{Headers, HttpRequest, Method};
use crate::name::Name;
use crate::util::Caseless;

/// The label separating payload labels from path labels.
pub const SEPARATOR_LABEL: &[u8] = b"$";

/// How the payload labels of a query encode the payload.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PayloadEncoding {
    /// The labels are text, joined with `.`.
    #[default]
    Plain,

    /// The labels are concatenated and decoded as unpadded base64url.
    Base64,

    /// The labels are `application/x-www-form-urlencoded` text, joined
    /// with `&`, whose fields are merged into the form.
    Form,
}

impl FromStr for PayloadEncoding {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = Caseless(text);
        if text == Caseless("plain") {
            Ok(Self::Plain)
        } else if text == Caseless("base64") {
            Ok(Self::Base64)
        } else if text == Caseless("form") {
            Ok(Self::Form)
        } else {
            Err("unknown payload encoding")
        }
    }
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Base64 => f.write_str("base64"),
            Self::Form => f.write_str("form"),
        }
    }
}

/// The default [`RequestMapping`].
///
/// The labels in front of the tunnel domain are split at the first
/// [`SEPARATOR_LABEL`]. Labels to its left carry the payload, decoded
/// per [`LabelMapping::encoding`] and stored in the form field
/// [`LabelMapping::payload_field`]. Labels to its right are appended to
/// [`LabelMapping::path`] as path segments. Without a separator, every
/// label is payload.
///
/// So with the tunnel domain `256.bz` and default settings, the QNAME
/// `abc.$.v1.256.bz` maps to `POST /v1` on host `256.bz` with the form
/// `q=abc`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelMapping {
    pub method: Method,

    /// The destination host. Defaults to the tunnel domain.
    pub host: Option<String>,

    /// The destination port. Defaults to 80, or 443 with TLS.
    pub port: Option<u16>,

    pub use_tls: bool,

    /// The base path that path labels are appended to.
    pub path: String,

    /// The form field receiving the payload.
    pub payload_field: String,

    pub encoding: PayloadEncoding,

    /// Fields added to every request's form.
    pub form: Form,

    /// Header fields added to every request.
    pub headers: Headers,
}

impl Default for LabelMapping {
    fn default() -> Self {
        Self {
            method: Method::Post,
            host: None,
            port: None,
            use_tls: false,
            path: "/".into(),
            payload_field: "q".into(),
            encoding: PayloadEncoding::Plain,
            form: Form::new(),
            headers: Headers::default(),
        }
    }
}

impl LabelMapping {
    fn decode_payload(&self, labels: &[&[u8]], form: &mut Form) -> Result<(), Error> {
        match self.encoding {
            PayloadEncoding::Plain => {
                let text = labels_to_text(labels, ".")?;
                form.insert(self.payload_field.clone(), text);
            }
            PayloadEncoding::Base64 => {
                let encoded = labels.concat();
                let decoded = URL_SAFE_NO_PAD
                    .decode(encoded)
                    .or(Err(Error::InvalidPayload("bad base64url")))?;
                let text = String::from_utf8(decoded)
                    .or(Err(Error::InvalidPayload("payload is not UTF-8")))?;
                form.insert(self.payload_field.clone(), text);
            }
            PayloadEncoding::Form => {
                let text = labels_to_text(labels, "&")?;
                form.extend(form::decode(&text)?);
            }
        }
        Ok(())
    }

    fn build_path(&self, segments: &[&[u8]]) -> String {
        let mut path = self.path.trim_end_matches('/').to_owned();
        for segment in segments {
            path.push('/');
            path.push_str(&form::encode_path_segment(segment));
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }
}

impl RequestMapping for LabelMapping {
    fn map(&self, relative: &[&[u8]], domain: &Name) -> Result<HttpRequest, Error> {
        let (payload, segments) = match relative.iter().position(|l| *l == SEPARATOR_LABEL) {
            Some(index) => (&relative[..index], &relative[index + 1..]),
            None => (relative, &[][..]),
        };

        let mut form = self.form.clone();
        if !payload.is_empty() {
            self.decode_payload(payload, &mut form)?;
        }

        let host = match self.host {
            Some(ref host) => host.clone(),
            None => domain.to_string().trim_end_matches('.').to_owned(),
        };
        let port = self
            .port
            .unwrap_or(if self.use_tls { 443 } else { 80 });

        Ok(HttpRequest {
            method: self.method,
            host,
            path: self.build_path(segments),
            use_tls: self.use_tls,
            port,
            headers: self.headers.clone(),
            form,
        })
    }
}

fn labels_to_text(labels: &[&[u8]], separator: &str) -> Result<String, Error> {
    let parts = labels
        .iter()
        .map(|label| std::str::from_utf8(label))
        .collect::<Result<Vec<_>, _>>()
        .or(Err(Error::InvalidPayload("payload is not UTF-8")))?;
    Ok(parts.join(separator))
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn map(mapping: &LabelMapping, relative: &[&[u8]]) -> Result<HttpRequest, Error> {
        mapping.map(relative, &"256.bz.".parse().unwrap())
    }

    #[test]
    fn labels_after_the_separator_become_the_path() {
        let mapping = LabelMapping {
            path: "/api/".into(),
            ..Default::default()
        };
        let request = map(&mapping, &[b"hello", b"world", b"$", b"v1", b"a b"]).unwrap();
        assert_eq!(request.path, "/api/v1/a%20b");
        assert_eq!(request.form["q"], "hello.world");
    }

    #[test]
    fn missing_separator_means_all_payload() {
        let request = map(&LabelMapping::default(), &[b"x", b"y"]).unwrap();
        assert_eq!(request.path, "/");
        assert_eq!(request.form["q"], "x.y");
    }

    #[test]
    fn empty_payload_adds_no_field() {
        let request = map(&LabelMapping::default(), &[b"$", b"status"]).unwrap();
        assert_eq!(request.path, "/status");
        assert!(request.form.is_empty());
        let request = map(&LabelMapping::default(), &[]).unwrap();
        assert_eq!(request.path, "/");
    }

    #[test]
    fn base64_payloads_are_decoded() {
        let mapping = LabelMapping {
            encoding: PayloadEncoding::Base64,
            payload_field: "data".into(),
            ..Default::default()
        };
        // "hello, tunnel" split over two labels.
        let request = map(&mapping, &[b"aGVsbG8sIH", b"R1bm5lbA", b"$"]).unwrap();
        assert_eq!(request.form["data"], "hello, tunnel");
        assert_eq!(
            map(&mapping, &[b"!!!"]),
            Err(Error::InvalidPayload("bad base64url"))
        );
    }

    #[test]
    fn form_payloads_are_merged() {
        let mut mapping = LabelMapping {
            encoding: PayloadEncoding::Form,
            ..Default::default()
        };
        mapping.form.insert("a".into(), "static".into());
        let request = map(&mapping, &[b"a=1", b"b=two+words"]).unwrap();
        assert_eq!(request.form["a"], "1");
        assert_eq!(request.form["b"], "two words");
        assert!(!request.form.contains_key("q"));
    }

    #[test]
    fn destination_settings_apply() {
        let mut mapping = LabelMapping {
            host: Some("api.example.com".into()),
            use_tls: true,
            method: Method::Get,
            ..Default::default()
        };
        mapping.headers.insert("X-Tunnel", "80over53");
        let request = map(&mapping, &[b"ping"]).unwrap();
        assert_eq!(request.host, "api.example.com");
        assert_eq!(request.port, 443);
        assert_eq!(request.url(), "https://api.example.com/?q=ping");
        assert_eq!(request.headers.get("x-tunnel"), Some("80over53"));
    }

    #[test]
    fn non_utf8_labels_are_rejected() {
        assert_eq!(
            map(&LabelMapping::default(), &[b"\xff"]),
            Err(Error::InvalidPayload("payload is not UTF-8"))
        );
    }

    #[test]
    fn encodings_parse() {
        assert_eq!("Base64".parse(), Ok(PayloadEncoding::Base64));
        assert_eq!("plain".parse(), Ok(PayloadEncoding::Plain));
        assert!("rot13".parse::<PayloadEncoding>().is_err());
    }
}
