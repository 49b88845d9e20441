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

//! Implements the gateway configuration file.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use over53::http::{Headers, Method};
use over53::io::{GatewayConfig, Settings};
use over53::name::Name;
use over53::transform::{LabelMapping, PayloadEncoding};

use crate::args::Args;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration: from the configuration file if one was
/// given, and otherwise from the command line. The `--verbose`,
/// `--locale` and `--user` options apply in both cases.
pub fn load(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => load_from_path(path)?,
        None => load_from_args(args)?,
    };
    config.verbose |= args.verbose;
    if args.locale.is_some() {
        config.locale = args.locale.clone();
    }
    if args.user.is_some() {
        config.user = args.user.clone();
    }
    Ok(config)
}

/// Loads the configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    toml::from_slice(&raw_config).context("failed to parse the configuration file")
}

/// Builds the configuration from the parsed command line arguments.
fn load_from_args(args: &Args) -> Result<Config> {
    let domain = args
        .domain
        .clone()
        .ok_or_else(|| anyhow!("no tunnel domain was given"))?;
    let bind = args.bind.unwrap_or_else(|| {
        let ip = args.ip.unwrap_or(DEFAULT_BIND_IP);
        let port = args.port.unwrap_or(DEFAULT_BIND_PORT);
        SocketAddr::new(ip, port)
    });
    Ok(Config {
        bind,
        domain: ConfigName(domain),
        verbose: false,
        locale: None,
        user: None,
        max_connections: default_max_connections(),
        poll_timeout: default_poll_timeout(),
        log_output: LogOutput::default(),
        mapping: MappingConfig::default(),
    })
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
pub fn log_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mapping = &config.mapping;
    let mut message = format!(
        "Configuration loaded:\n\
         Bind address:    {}\n\
         Domain:          {}\n\
         Max connections: {}\n\
         Poll timeout:    {} s\n\
         Method:          {}\n\
         Destination:     {}{}{}\n\
         Encoding:        {}",
        config.bind,
        config.domain.0,
        config.max_connections,
        config.poll_timeout,
        mapping.method.as_ref().map_or(Method::Post, |m| m.0),
        if mapping.tls { "https://" } else { "http://" },
        mapping.host.as_deref().unwrap_or("(the domain)"),
        mapping.path.as_deref().unwrap_or("/"),
        mapping.encoding.as_ref().map_or(PayloadEncoding::Plain, |e| e.0),
    );
    for (name, value) in &mapping.form {
        write!(message, "\n  form {}={}", name, value).unwrap();
    }
    for (name, value) in &mapping.headers {
        write!(message, "\n  header {}: {}", name, value).unwrap();
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub domain: ConfigName,
    #[serde(default)]
    pub verbose: bool,
    pub locale: Option<String>,
    pub user: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(
        default = "default_poll_timeout",
        deserialize_with = "deserialize_poll_timeout"
    )]
    pub poll_timeout: u64,
    #[serde(default)]
    pub log_output: LogOutput,
    #[serde(default)]
    pub mapping: MappingConfig,
}

impl Config {
    /// Returns the reloadable part of the configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            domain: self.domain.0.clone(),
            mapping: Box::new(self.mapping.to_label_mapping()),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_connections: self.max_connections,
            poll_timeout: Duration::from_secs(self.poll_timeout),
        }
    }
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 53;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

fn default_max_connections() -> usize {
    GatewayConfig::default().max_connections
}

fn default_poll_timeout() -> u64 {
    GatewayConfig::default().poll_timeout.as_secs()
}

/// A zero timeout would make the event loop spin, so it is refused.
fn deserialize_poll_timeout<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: de::Deserializer<'de>,
{
    let seconds = u64::deserialize(deserializer)?;
    if seconds == 0 {
        Err(de::Error::invalid_value(
            de::Unexpected::Unsigned(0),
            &"a positive number of seconds",
        ))
    } else {
        Ok(seconds)
    }
}

/// Where log output goes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub enum LogOutput {
    #[default]
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "stdout")]
    Stdout,
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: MAPPING                                     //
////////////////////////////////////////////////////////////////////////

/// The configuration of the [`LabelMapping`]. Anything left out keeps
/// the mapping's default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    pub method: Option<ConfigMethod>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    pub path: Option<String>,
    pub payload_field: Option<String>,
    pub encoding: Option<ConfigEncoding>,
    #[serde(default)]
    pub form: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl MappingConfig {
    pub fn to_label_mapping(&self) -> LabelMapping {
        let mut mapping = LabelMapping {
            host: self.host.clone(),
            port: self.port,
            use_tls: self.tls,
            form: self.form.clone(),
            ..Default::default()
        };
        if let Some(ref method) = self.method {
            mapping.method = method.0;
        }
        if let Some(ref path) = self.path {
            mapping.path = path.clone();
        }
        if let Some(ref field) = self.payload_field {
            mapping.payload_field = field.clone();
        }
        if let Some(ref encoding) = self.encoding {
            mapping.encoding = encoding.0;
        }
        let mut headers = Headers::default();
        for (name, value) in &self.headers {
            headers.insert(name.as_str(), value.as_str());
        }
        mapping.headers = headers;
        mapping
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER OVER53 TYPES FOR SERDE                               //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`over53`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over an [`over53`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigMethod, Method, "HTTP method");
make_serde_wrapper!(ConfigEncoding, PayloadEncoding, "payload encoding");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
