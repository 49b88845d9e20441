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

//! Implementation of the [`HttpRequest`] type and its serialization.

use std::fmt::{self, Write};
use std::str::FromStr;

use super::form::{self, Form};
use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// METHODS                                                            //
////////////////////////////////////////////////////////////////////////

/// An HTTP request method.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
}

impl Method {
    const ALL: [Self; 7] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Trace,
        Self::Connect,
    ];

    /// Returns the method token as sent on the request line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| Caseless(method.as_str()) == Caseless(text))
            .ok_or("unknown HTTP method")
    }
}

////////////////////////////////////////////////////////////////////////
// HEADERS                                                            //
////////////////////////////////////////////////////////////////////////

/// An ordered list of header fields whose names are unique, compared
/// without regard to ASCII case.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Sets a header field. If a field with the same name already
    /// exists, its value is replaced in place (and its original name
    /// spelling kept); otherwise the field is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.0[index].1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Returns the value of the named field, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.0[index].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|(existing, _)| Caseless(existing) == Caseless(name))
    }
}

////////////////////////////////////////////////////////////////////////
// REQUESTS                                                           //
////////////////////////////////////////////////////////////////////////

/// An HTTP request to be sent to a destination server.
///
/// For POST requests the form travels in the body; for every other
/// method it is encoded into the query string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub use_tls: bool,
    pub port: u16,
    pub headers: Headers,
    pub form: Form,
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

impl HttpRequest {
    /// Returns the default port for the request's scheme.
    pub fn default_port(&self) -> u16 {
        if self.use_tls {
            443
        } else {
            80
        }
    }

    /// Returns the request URL, `http(s)://host[:port]path[?query]`.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        let mut url = format!("{}://{}", scheme, self.authority());
        self.write_target(&mut url);
        url
    }

    /// Serializes the request as HTTP/1.1.
    ///
    /// `Host` and `Connection: close` are added when not already
    /// present; POST requests also get `Content-Length` and a default
    /// `Content-Type`. Added fields precede the request's own headers.
    pub fn serialize(&self) -> Vec<u8> {
        let body = if self.method == Method::Post {
            form::encode(&self.form)
        } else {
            String::new()
        };

        let mut out = format!("{} ", self.method);
        self.write_target(&mut out);
        out.push_str(" HTTP/1.1\r\n");

        // NOTE: writing to a String never fails.
        if !self.headers.contains("Host") {
            let _ = write!(out, "Host: {}\r\n", self.authority());
        }
        if !self.headers.contains("Connection") {
            out.push_str("Connection: close\r\n");
        }
        if self.method == Method::Post {
            if !self.headers.contains("Content-Length") {
                let _ = write!(out, "Content-Length: {}\r\n", body.len());
            }
            if !self.headers.contains("Content-Type") {
                let _ = write!(out, "Content-Type: {}\r\n", FORM_CONTENT_TYPE);
            }
        }
        for (name, value) in self.headers.iter() {
            let _ = write!(out, "{}: {}\r\n", name, value);
        }
        out.push_str("\r\n");
        out.push_str(&body);
        out.into_bytes()
    }

    /// Returns `host[:port]`, with the port omitted when it is the
    /// scheme default.
    fn authority(&self) -> String {
        if self.port == self.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Appends the path and, for non-POST requests with a form, the
    /// query string.
    fn write_target(&self, out: &mut String) {
        out.push_str(&self.path);
        if self.method != Method::Post && !self.form.is_empty() {
            out.push('?');
            out.push_str(&form::encode(&self.form));
        }
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            method: Method::Get,
            host: "localhost".into(),
            path: "/index.html".into(),
            use_tls: false,
            port: 80,
            headers: Headers::default(),
            form: Form::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn text(request: &HttpRequest) -> String {
        String::from_utf8(request.serialize()).unwrap()
    }

    #[test]
    fn default_request_serializes() {
        let request = HttpRequest::default();
        assert_eq!(
            text(&request),
            "GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        );
        assert_eq!(request.url(), "http://localhost/index.html");
    }

    #[test]
    fn post_puts_the_form_in_the_body() {
        let mut request = HttpRequest {
            method: Method::Post,
            host: "256.bz".into(),
            path: "/".into(),
            ..Default::default()
        };
        request.form.insert("q".into(), "abc".into());
        request.form.insert("src".into(), "dns".into());
        assert_eq!(
            text(&request),
            "POST / HTTP/1.1\r\n\
             Host: 256.bz\r\n\
             Connection: close\r\n\
             Content-Length: 13\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             \r\n\
             q=abc&src=dns"
        );
        assert_eq!(request.url(), "http://256.bz/");
    }

    #[test]
    fn get_puts_the_form_in_the_query() {
        let mut request = HttpRequest {
            path: "/search".into(),
            port: 8080,
            ..Default::default()
        };
        request.form.insert("q".into(), "a b".into());
        assert_eq!(
            text(&request),
            "GET /search?q=a+b HTTP/1.1\r\nHost: localhost:8080\r\nConnection: close\r\n\r\n"
        );
        assert_eq!(request.url(), "http://localhost:8080/search?q=a+b");
    }

    #[test]
    fn existing_headers_are_not_duplicated() {
        let mut request = HttpRequest {
            method: Method::Post,
            ..Default::default()
        };
        request.headers.insert("host", "example.com");
        request.headers.insert("Content-Type", "text/plain");
        request.headers.insert("X-Tunnel", "1");
        request.headers.insert("CONTENT-TYPE", "application/json");
        assert_eq!(request.headers.len(), 3);
        assert_eq!(
            text(&request),
            "POST /index.html HTTP/1.1\r\n\
             Connection: close\r\n\
             Content-Length: 0\r\n\
             host: example.com\r\n\
             Content-Type: application/json\r\n\
             X-Tunnel: 1\r\n\
             \r\n"
        );
    }

    #[test]
    fn tls_changes_the_default_port() {
        let request = HttpRequest {
            use_tls: true,
            port: 443,
            ..Default::default()
        };
        assert_eq!(request.url(), "https://localhost/index.html");
        let request = HttpRequest {
            use_tls: true,
            port: 80,
            ..Default::default()
        };
        assert_eq!(request.url(), "https://localhost:80/index.html");
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("post".parse::<Method>(), Ok(Method::Post));
        assert_eq!("CONNECT".parse::<Method>(), Ok(Method::Connect));
        assert!("PATCH".parse::<Method>().is_err());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
