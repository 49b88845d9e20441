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

//! Runs the gateway.

use std::error::Error;
use std::ffi::CString;
use std::fmt::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, bail, Context, Result};
use env_logger::{Env, Target};
use log::{error, info};
use nix::unistd::{initgroups, setgid, setuid, User};

use over53::io::{Gateway, Reloader, Settings};

use crate::args::Args;
use crate::config::{self, Config, LogOutput};

/// Runs the gateway, exiting the process with status 1 on failure.
pub fn run(args: Args) {
    // The configuration decides where logs go, so it is loaded before
    // the logger exists; it is summarized once the logger is up.
    let loaded = config::load(&args);
    match loaded {
        Ok(ref config) => init_logging(config.verbose, config.log_output),
        Err(_) => init_logging(args.verbose, LogOutput::default()),
    }

    if let Err(e) = loaded.and_then(|config| try_running(args, config)) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn init_logging(verbose: bool, output: LogOutput) {
    let default_filter = if verbose { "debug" } else { "info" };
    let target = match output {
        LogOutput::Stderr => Target::Stderr,
        LogOutput::Stdout => Target::Stdout,
    };
    env_logger::Builder::from_env(Env::new().default_filter_or(default_filter))
        .target(target)
        .init();
}

fn try_running(args: Args, config: Config) -> Result<()> {
    info!(
        "80over53 gateway v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );
    match args.config {
        Some(ref path) => info!("Loaded the configuration from {}.", path.display()),
        None => info!("Loaded the configuration from the command line."),
    }
    config::log_summary(&config);

    if let Some(ref locale) = config.locale {
        set_locale(locale).context("failed to set the locale")?;
    }

    // Bind before dropping privileges, since the DNS port is usually
    // privileged.
    let mut gateway = Gateway::bind(config.bind, config.settings(), config.gateway_config())
        .with_context(|| format!("failed to bind {}", config.bind))?;
    if let Some(ref user) = config.user {
        drop_privileges(user).context("failed to drop privileges")?;
    }

    gateway
        .register_signals()
        .context("failed to set up signal handling")?;
    if let Some(path) = args.config {
        gateway.set_reloader(make_reloader(path));
    }

    info!("Set-up is complete; starting the gateway.");
    gateway.run().context("the event loop failed")?;
    info!("Shutdown complete.");
    Ok(())
}

/// Creates a [`Reloader`] that re-reads the configuration file. Only
/// the tunnel domain and the mapping take effect.
fn make_reloader(path: PathBuf) -> Reloader {
    Box::new(move || -> Result<Settings, Box<dyn Error + Send + Sync>> {
        let config =
            config::load_from_path(&path).context("failed to reload the configuration")?;
        config::log_summary(&config);
        Ok(config.settings())
    })
}

fn set_locale(locale: &str) -> Result<()> {
    let c_locale = CString::new(locale).context("the locale contains a NUL byte")?;

    // SAFETY: the argument is a valid C string, and no other threads
    // are running yet.
    let result = unsafe { libc::setlocale(libc::LC_ALL, c_locale.as_ptr()) };
    if result.is_null() {
        bail!("the locale {} is not available", locale);
    }
    info!("Set the locale to {}.", locale);
    Ok(())
}

fn drop_privileges(name: &str) -> Result<()> {
    let c_name = CString::new(name).context("the user name contains a NUL byte")?;
    let user = User::from_name(name)
        .context("failed to look up the user")?
        .ok_or_else(|| anyhow!("no such user: {}", name))?;

    // The groups must change first; without root, setgid and
    // initgroups would fail. initgroups also drops root's supplementary
    // groups.
    initgroups(&c_name, user.gid).context("failed to set the supplementary groups")?;
    setgid(user.gid).context("failed to set the group ID")?;
    setuid(user.uid).context("failed to set the user ID")?;
    info!(
        "Switched to user {} (uid {}, gid {}).",
        name, user.uid, user.gid
    );
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, getgroups, setgroups, ForkResult, Gid, Uid};

    #[test]
    fn dropping_privileges_clears_supplementary_groups() {
        // Only root can switch users.
        if !Uid::effective().is_root() {
            return;
        }
        let nobody = match User::from_name("nobody") {
            Ok(Some(nobody)) => nobody,
            _ => return,
        };

        // The switch cannot be undone, so it happens in a child process.
        // SAFETY: the child only makes system calls and then exits.
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let root = Gid::from_raw(0);
                let ok = setgroups(&[root, Gid::from_raw(4)]).is_ok()
                    && drop_privileges("nobody").is_ok()
                    && Uid::current() == nobody.uid
                    && Gid::current() == nobody.gid
                    && getgroups().map_or(false, |groups| !groups.contains(&root));
                // SAFETY: _exit is always safe to call.
                unsafe { libc::_exit(if ok { 0 } else { 1 }) };
            }
            ForkResult::Parent { child } => {
                assert_eq!(waitpid(child, None).unwrap(), WaitStatus::Exited(child, 0));
            }
        }
    }

    #[test]
    fn dropping_privileges_to_an_unknown_user_fails() {
        assert!(drop_privileges("no-such-user-over53").is_err());
        assert!(drop_privileges("nul\0user").is_err());
    }
}
