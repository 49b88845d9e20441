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

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use over53::name::Name;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The 80over53 HTTP-over-DNS gateway
#[derive(Debug, Parser)]
#[clap(author, version)]
#[clap(group(ArgGroup::new("required").required(true).args(&["config", "domain"])))]
pub struct Args {
    /// Log at the debug level
    #[clap(short, long)]
    pub verbose: bool,

    /// Set the configuration file to use
    #[clap(
        short,
        long,
        conflicts_with_all = &["bind", "ip", "port", "domain"],
        value_name = "FILE"
    )]
    pub config: Option<PathBuf>,

    /// Set the listener bind IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Set the listener bind IP address
    #[clap(short = '4', long, conflicts_with = "bind", value_name = "IP")]
    pub ip: Option<IpAddr>,

    /// Set the listener port
    #[clap(short, long, conflicts_with = "bind", value_name = "PORT")]
    pub port: Option<u16>,

    /// Set the tunnel domain
    #[clap(short, long, value_name = "DOMAIN")]
    pub domain: Option<Name>,

    /// Set the process locale
    #[clap(short, long, value_name = "LOCALE")]
    pub locale: Option<String>,

    /// Switch to this user after binding the listener
    #[clap(short, long, value_name = "USER")]
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_options_parse() {
        let args = Args::try_parse_from([
            "over53d", "-v", "-4", "127.0.0.1", "-p", "5353", "-d", "256.bz", "-u", "nobody",
        ])
        .unwrap();
        assert!(args.verbose);
        assert_eq!(args.ip, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(args.port, Some(5353));
        assert_eq!(args.domain, Some("256.bz.".parse().unwrap()));
        assert_eq!(args.user.as_deref(), Some("nobody"));
    }

    #[test]
    fn a_domain_or_configuration_is_required() {
        assert!(Args::try_parse_from(["over53d", "-v"]).is_err());
        assert!(Args::try_parse_from(["over53d", "-c", "over53.toml"]).is_ok());
    }

    #[test]
    fn configuration_conflicts_with_listener_options() {
        assert!(Args::try_parse_from(["over53d", "-c", "over53.toml", "-p", "53"]).is_err());
        assert!(
            Args::try_parse_from(["over53d", "-d", "256.bz", "--bind", "[::1]:53", "-p", "53"])
                .is_err()
        );
    }
}
