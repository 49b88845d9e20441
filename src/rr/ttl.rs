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

//! Provides the [`Ttl`] structure for DNS RR TTLs.

use std::fmt;

/// The time to live (TTL) of a DNS record.
///
/// The TTL occupies 32 bits on the wire, but [RFC 2181 § 8] limits
/// meaningful values to 0 through 2³¹ - 1. A value received with the
/// most significant bit set is interpreted as zero.
///
/// [RFC 2181 § 8]: https://datatracker.ietf.org/doc/html/rfc2181#section-8
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ttl(u32);

impl From<u32> for Ttl {
    fn from(raw: u32) -> Self {
        if raw > i32::MAX as u32 {
            Self(0)
        } else {
            Self(raw)
        }
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ttls_are_not_modified() {
        assert_eq!(u32::from(Ttl::from(0)), 0);
        assert_eq!(u32::from(Ttl::from(86400)), 86400);
        assert_eq!(u32::from(Ttl::from(i32::MAX as u32)), i32::MAX as u32);
    }

    #[test]
    fn ttls_with_the_high_bit_become_zero() {
        assert_eq!(u32::from(Ttl::from(0x8000_0000)), 0);
        assert_eq!(u32::from(Ttl::from(u32::MAX)), 0);
    }
}
