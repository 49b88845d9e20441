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

//! Stop, reload and report requests, from signals or from code.
//!
//! Requests are recorded in atomic flags. Every request also writes a
//! byte to a self-pipe whose read end is part of the event loop's poll
//! set, so a blocked `poll` wakes up promptly.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::low_level::pipe;
use signal_hook::SigId;

/// A request made of the event loop.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Control {
    /// Shut down gracefully.
    Stop,

    /// Re-read the configuration.
    Reload,

    /// Log the current state.
    Report,
}

struct Flags {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
    report: Arc<AtomicBool>,
    wake: UnixStream,
}

/// The receiving side of control requests, owned by the event loop.
pub struct Controller {
    flags: Arc<Flags>,
    wake_read: UnixStream,
    sig_ids: Vec<SigId>,
}

/// A clonable handle for making control requests from code, including
/// from other threads.
#[derive(Clone)]
pub struct ControlHandle(Arc<Flags>);

impl Controller {
    pub fn new() -> io::Result<Self> {
        let (wake_read, wake_write) = UnixStream::pair()?;
        wake_read.set_nonblocking(true)?;
        wake_write.set_nonblocking(true)?;
        Ok(Self {
            flags: Arc::new(Flags {
                stop: Arc::new(AtomicBool::new(false)),
                reload: Arc::new(AtomicBool::new(false)),
                report: Arc::new(AtomicBool::new(false)),
                wake: wake_write,
            }),
            wake_read,
            sig_ids: Vec::new(),
        })
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle(self.flags.clone())
    }

    /// Installs signal handlers: SIGTERM, SIGINT and SIGQUIT request a
    /// stop, SIGHUP and SIGUSR1 a reload, and SIGUSR2 a report. A second
    /// stop signal arriving after the first exits the process at once.
    ///
    /// The handlers are removed when the `Controller` is dropped.
    pub fn register_signals(&mut self) -> io::Result<()> {
        let flags = &self.flags;
        let signals = [
            (SIGTERM, &flags.stop),
            (SIGINT, &flags.stop),
            (SIGQUIT, &flags.stop),
            (SIGHUP, &flags.reload),
            (SIGUSR1, &flags.reload),
            (SIGUSR2, &flags.report),
        ];
        for (sig, flag) in signals {
            // The conditional shutdown must be registered before the
            // flag is, so that it sees the flag as it was before this
            // signal arrived.
            if Arc::ptr_eq(flag, &flags.stop) {
                self.sig_ids.push(signal_hook::flag::register_conditional_shutdown(
                    sig,
                    1,
                    flag.clone(),
                )?);
            }
            self.sig_ids
                .push(signal_hook::flag::register(sig, flag.clone())?);
            self.sig_ids
                .push(pipe::register(sig, flags.wake.try_clone()?)?);
        }
        Ok(())
    }

    /// Returns the descriptor that becomes readable when a request is
    /// made.
    pub fn wake_fd(&self) -> RawFd {
        self.wake_read.as_raw_fd()
    }

    pub fn stop_requested(&self) -> bool {
        self.flags.stop.load(Ordering::SeqCst)
    }

    /// Empties the self-pipe and collects the pending requests. Reload
    /// and report requests are consumed; a stop request stays in force.
    pub fn drain(&mut self) -> Vec<Control> {
        let mut buf = [0; 64];
        while let Ok(n) = self.wake_read.read(&mut buf) {
            if n == 0 {
                break;
            }
        }

        let mut requests = Vec::new();
        if self.flags.reload.swap(false, Ordering::SeqCst) {
            requests.push(Control::Reload);
        }
        if self.flags.report.swap(false, Ordering::SeqCst) {
            requests.push(Control::Report);
        }
        if self.stop_requested() {
            requests.push(Control::Stop);
        }
        requests
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        for sig_id in self.sig_ids.drain(..) {
            signal_hook::low_level::unregister(sig_id);
        }
    }
}

impl ControlHandle {
    pub fn stop(&self) {
        self.request(&self.0.stop);
    }

    pub fn reload(&self) {
        self.request(&self.0.reload);
    }

    pub fn report(&self) {
        self.request(&self.0.report);
    }

    fn request(&self, flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);

        // A full pipe already guarantees a wake-up.
        let _ = (&self.0.wake).write(&[1]);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use nix::poll::{poll, PollFd, PollFlags};

    fn readable(controller: &Controller) -> bool {
        let mut poll_fds = [PollFd::new(controller.wake_fd(), PollFlags::POLLIN)];
        poll(&mut poll_fds, 0).unwrap() > 0
    }

    #[test]
    fn requests_wake_and_drain() {
        let mut controller = Controller::new().unwrap();
        let handle = controller.handle();
        assert!(!readable(&controller));
        assert!(controller.drain().is_empty());

        handle.report();
        handle.reload();
        handle.report();
        assert!(readable(&controller));
        assert_eq!(controller.drain(), [Control::Reload, Control::Report]);
        assert!(!readable(&controller));
        assert!(controller.drain().is_empty());
    }

    #[test]
    fn stop_stays_in_force() {
        let mut controller = Controller::new().unwrap();
        controller.handle().clone().stop();
        assert!(controller.stop_requested());
        assert_eq!(controller.drain(), [Control::Stop]);
        assert_eq!(controller.drain(), [Control::Stop]);
    }

    #[test]
    fn handles_work_across_threads() {
        let mut controller = Controller::new().unwrap();
        let handle = controller.handle();
        std::thread::spawn(move || handle.reload()).join().unwrap();
        assert_eq!(controller.drain(), [Control::Reload]);
    }
}
