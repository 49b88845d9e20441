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

//! Resolution of request destinations to socket addresses.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use log::debug;

use super::{Error, HttpRequest};

/// Resolves host names to socket addresses.
pub trait Resolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// A [`Resolver`] backed by the platform resolver (`getaddrinfo`).
///
/// The lookup blocks, so a slow resolver stalls the event loop for its
/// duration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// Resolves the destination of `request` to an IPv4 or IPv6 socket
/// address with the request's port. The first address returned by the
/// resolver is used.
pub fn resolve_destination(
    request: &HttpRequest,
    resolver: &dyn Resolver,
) -> Result<SocketAddr, Error> {
    let failed = |reason: String| Error::ResolutionFailed {
        host: request.host.clone(),
        reason,
    };
    let addresses = resolver
        .resolve(&request.host, request.port)
        .map_err(|err| failed(err.to_string()))?;
    debug!("{} resolved to {:?}", request.host, addresses);
    addresses
        .into_iter()
        .next()
        .ok_or_else(|| failed("no addresses found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<SocketAddr>);

    impl Resolver for Fixed {
        fn resolve(&self, _host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
            Ok(self
                .0
                .iter()
                .map(|address| SocketAddr::new(address.ip(), port))
                .collect())
        }
    }

    #[test]
    fn first_address_wins_and_port_is_applied() {
        let resolver = Fixed(vec![
            "[2001:db8::1]:0".parse().unwrap(),
            "192.0.2.1:0".parse().unwrap(),
        ]);
        let request = HttpRequest {
            port: 8443,
            ..Default::default()
        };
        assert_eq!(
            resolve_destination(&request, &resolver),
            Ok("[2001:db8::1]:8443".parse().unwrap())
        );
    }

    #[test]
    fn empty_answers_fail() {
        let request = HttpRequest::default();
        assert!(matches!(
            resolve_destination(&request, &Fixed(Vec::new())),
            Err(Error::ResolutionFailed { .. })
        ));
    }

    #[test]
    fn system_resolver_handles_literals() {
        let addresses = SystemResolver.resolve("127.0.0.1", 80).unwrap();
        assert_eq!(addresses, ["127.0.0.1:80".parse::<SocketAddr>().unwrap()]);
    }
}
