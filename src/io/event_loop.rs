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

//! Implementation of the [`Gateway`] event loop.

// NOTE: Errors concerning a single datagram, question or connection are
// logged and otherwise ignored; only failures of the listener setup or
// of poll itself end the loop.

use std::fmt::{self, Write};
use std::io;
use std::mem;
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use log::Level::Debug;
use log::{debug, error, info, log_enabled, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use rustls::{ClientConfig, RootCertStore};

use super::connection::{Connection, ReadOutcome};
use super::control::{Control, ControlHandle, Controller};
use super::table::{ConnectionTable, Handle};
use crate::http::{self, Resolver, SystemResolver};
use crate::message::{Header, Opcode, Question, Reader};
use crate::name::Name;
use crate::transform::{self, RequestMapping};

/// The size of the datagram receive buffer. Tunnel queries are expected
/// to fit in 512 octets; anything longer than this is truncated.
pub const RECV_BUFFER_SIZE: usize = 2048;

const READ_BUFFER_SIZE: usize = 4096;

/// What the gateway forwards: the tunnel domain and the strategy for
/// mapping queries under it to HTTP requests. These can be replaced
/// while running (see [`Gateway::set_reloader`]).
pub struct Settings {
    pub domain: Name,
    pub mapping: Box<dyn RequestMapping + Send>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Settings")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Fixed parameters of a [`Gateway`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GatewayConfig {
    /// The maximum number of simultaneously open outbound connections.
    pub max_connections: usize,

    /// How long a single poll may block.
    pub poll_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            poll_timeout: Duration::from_secs(15),
        }
    }
}

/// A source of fresh [`Settings`], consulted on reload requests.
pub type Reloader =
    Box<dyn FnMut() -> Result<Settings, Box<dyn std::error::Error + Send + Sync>> + Send>;

/// The lifecycle state of a [`Gateway`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
    Running,
    Stopping,
    Terminated,
}

/// Counters kept by a [`Gateway`] since it started.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub datagrams: u64,
    pub ignored_messages: u64,
    pub questions: u64,
    pub rejected_questions: u64,
    pub connections_opened: u64,
    pub connections_evicted: u64,
    pub connections_closed: u64,
    pub connections_failed: u64,
    pub bytes_received: u64,
}

/// The gateway event loop.
///
/// A `Gateway` owns one UDP listener and a [`ConnectionTable`] of
/// outbound connections, and multiplexes them with `poll` on a single
/// thread. Every tunnel query in a received datagram becomes an HTTP
/// request sent over a fresh connection; responses are read, logged
/// and discarded until the destination closes the connection.
pub struct Gateway {
    listener: Option<UdpSocket>,
    controller: Controller,
    connections: ConnectionTable<Connection>,
    settings: Settings,
    config: GatewayConfig,
    resolver: Box<dyn Resolver + Send>,
    reloader: Option<Reloader>,
    tls_config: Option<Arc<ClientConfig>>,
    state: State,
    stats: Stats,
    recv_buf: Vec<u8>,
    read_buf: Vec<u8>,
}

impl Gateway {
    /// Binds the UDP listener to `addr` and creates the gateway.
    pub fn bind(addr: SocketAddr, settings: Settings, config: GatewayConfig) -> io::Result<Self> {
        Self::from_socket(UdpSocket::bind(addr)?, settings, config)
    }

    /// Creates the gateway around an already-bound UDP socket.
    pub fn from_socket(
        listener: UdpSocket,
        settings: Settings,
        config: GatewayConfig,
    ) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: Some(listener),
            controller: Controller::new()?,
            connections: ConnectionTable::new(config.max_connections),
            settings,
            config,
            resolver: Box::new(SystemResolver),
            reloader: None,
            tls_config: None,
            state: State::Running,
            stats: Stats::default(),
            recv_buf: vec![0; RECV_BUFFER_SIZE],
            read_buf: vec![0; READ_BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self.listener {
            Some(ref listener) => listener.local_addr(),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Returns a handle through which the gateway can be stopped,
    /// reloaded or asked for a report.
    pub fn control_handle(&self) -> ControlHandle {
        self.controller.handle()
    }

    /// Routes process signals to the gateway (see
    /// [`Controller::register_signals`]).
    pub fn register_signals(&mut self) -> io::Result<()> {
        self.controller.register_signals()
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn Resolver + Send>) {
        self.resolver = resolver;
    }

    pub fn set_reloader(&mut self, reloader: Reloader) {
        self.reloader = Some(reloader);
    }

    /// Sets the TLS configuration for `https` destinations. Without
    /// one, a configuration trusting the webpki roots is built on first
    /// use.
    pub fn set_tls_config(&mut self, tls_config: Arc<ClientConfig>) {
        self.tls_config = Some(tls_config);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs the loop until a stop is requested and cleanup is done.
    ///
    /// A fatal error also cleans up before it is returned.
    pub fn run(&mut self) -> io::Result<()> {
        if let Ok(addr) = self.local_addr() {
            info!(
                "Forwarding queries for {} received on {}.",
                self.settings.domain, addr
            );
        }
        while self.state != State::Terminated {
            if let Err(e) = self.run_once() {
                self.shut_down();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs a single iteration of the loop: services control requests,
    /// waits for readiness and services whatever became ready.
    pub fn run_once(&mut self) -> io::Result<()> {
        for request in self.controller.drain() {
            match request {
                Control::Stop => {
                    if self.state == State::Running {
                        info!("Stop requested; shutting down.");
                        self.state = State::Stopping;
                    }
                }
                Control::Reload => self.reload(),
                Control::Report => self.report(),
            }
        }
        match self.state {
            State::Running => (),
            State::Stopping => {
                self.shut_down();
                return Ok(());
            }
            State::Terminated => return Ok(()),
        }

        let listener_fd = match self.listener {
            Some(ref listener) => listener.as_raw_fd(),
            None => return Ok(()),
        };
        let mut handles = Vec::with_capacity(self.connections.len());
        let mut poll_fds = Vec::with_capacity(self.connections.len() + 2);
        poll_fds.push(PollFd::new(listener_fd, PollFlags::POLLIN));
        poll_fds.push(PollFd::new(self.controller.wake_fd(), PollFlags::POLLIN));
        for (handle, connection) in self.connections.iter() {
            handles.push(handle);
            poll_fds.push(PollFd::new(connection.as_raw_fd(), connection.interest()));
        }

        let millis = self
            .config
            .poll_timeout
            .as_millis()
            .try_into()
            .unwrap_or(i32::MAX);
        match poll(&mut poll_fds, millis) {
            Ok(0) => {
                debug!(
                    "Poll timed out with {} open connections.",
                    self.connections.len()
                );
                return Ok(());
            }
            Ok(_) => (),
            Err(Errno::EINTR) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let revents: Vec<PollFlags> = poll_fds
            .iter()
            .map(|poll_fd| poll_fd.revents().unwrap_or_else(PollFlags::empty))
            .collect();

        // The listener goes first.
        if !revents[0].is_empty() {
            self.service_listener();
        }

        // Then the connections, oldest first. Connections evicted while
        // servicing the listener have stale handles and are skipped.
        for (handle, events) in handles.iter().zip(&revents[2..]) {
            if !events.is_empty() {
                self.service_connection(*handle, *events);
            }
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////
    // LISTENER                                                       //
    ////////////////////////////////////////////////////////////////////

    fn service_listener(&mut self) {
        let mut buf = mem::take(&mut self.recv_buf);
        let received = match self.listener {
            Some(ref listener) => listener.recv_from(&mut buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        };
        match received {
            Ok((len, source)) => {
                self.stats.datagrams += 1;
                self.process_datagram(&buf[..len], source);
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => error!("Failed to receive a datagram: {}.", e),
        }
        self.recv_buf = buf;
    }

    fn process_datagram(&mut self, octets: &[u8], source: SocketAddr) {
        let mut reader = match Reader::try_from(octets) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Dropping a malformed datagram from {}: {}.", source, e);
                return;
            }
        };
        let header = *reader.header();
        debug!(
            "Received {} octets from {}: {}.",
            octets.len(),
            source,
            header
        );

        if header.qr {
            info!(
                "Ignoring a response (id {}) from {}; only queries are forwarded.",
                header.id, source,
            );
            self.stats.ignored_messages += 1;
            return;
        }
        if header.opcode != Opcode::Query {
            info!(
                "Ignoring a {} message (id {}) from {}.",
                header.opcode, header.id, source,
            );
            self.stats.ignored_messages += 1;
            return;
        }

        for i in 0..header.qdcount {
            let question = match reader.read_question() {
                Ok(question) => question,
                Err(e) => {
                    // Without the question's length, later sections
                    // cannot be found either.
                    warn!(
                        "Failed to decode question {} of {} from {}: {}.",
                        i + 1,
                        header.qdcount,
                        source,
                        e,
                    );
                    return;
                }
            };
            self.stats.questions += 1;
            if let Err(e) = self.forward(&question) {
                warn!("Not forwarding [{}] from {}: {}.", question, source, e);
                self.stats.rejected_questions += 1;
            }
        }

        if log_enabled!(Debug) {
            log_records(reader, &header, octets.len());
        }
    }

    /// Turns `question` into a request and opens a connection for it.
    fn forward(&mut self, question: &Question) -> Result<(), ForwardError> {
        let request = transform::from_dns_question(
            question,
            &self.settings.domain,
            self.settings.mapping.as_ref(),
        )
        .map_err(ForwardError::Transform)?;
        let peer = http::resolve_destination(&request, self.resolver.as_ref())
            .map_err(ForwardError::Resolve)?;
        let tls = if request.use_tls {
            Some(self.tls_config())
        } else {
            None
        };
        let connection = Connection::open(peer, &request, tls).map_err(ForwardError::Connect)?;

        info!(
            "Forwarding [{}] as {} {}.",
            question,
            request.method,
            request.url()
        );
        let (handle, evicted) = self.connections.insert(connection);
        if let Some(evicted) = evicted {
            info!("Closed the evicted connection {}.", evicted);
            self.stats.connections_evicted += 1;
        }
        debug!("Opened connection {}.", handle);
        self.stats.connections_opened += 1;
        Ok(())
    }

    fn tls_config(&mut self) -> Arc<ClientConfig> {
        self.tls_config
            .get_or_insert_with(|| {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                Arc::new(
                    ClientConfig::builder()
                        .with_root_certificates(roots)
                        .with_no_client_auth(),
                )
            })
            .clone()
    }

    ////////////////////////////////////////////////////////////////////
    // CONNECTIONS                                                    //
    ////////////////////////////////////////////////////////////////////

    fn service_connection(&mut self, handle: Handle, events: PollFlags) {
        let connection = match self.connections.get_mut(handle) {
            Some(connection) => connection,
            None => return,
        };
        match drive(connection, events, &mut self.read_buf) {
            Ok(Some(n)) => {
                debug!("Read {} response bytes from {}.", n, connection.url());
                self.stats.bytes_received += n as u64;
            }
            Ok(None) => (),
            Err(ConnectionEnd::Closed) => {
                debug!(
                    "Connection {} to {} closed after {} bytes.",
                    handle,
                    connection.peer(),
                    connection.received(),
                );
                self.stats.connections_closed += 1;
                self.connections.remove(handle);
            }
            Err(ConnectionEnd::Failed(e)) => {
                warn!(
                    "Connection {} for {} failed: {}.",
                    handle,
                    connection.url(),
                    e
                );
                self.stats.connections_failed += 1;
                self.connections.remove(handle);
            }
        }
    }

    ////////////////////////////////////////////////////////////////////
    // CONTROL                                                        //
    ////////////////////////////////////////////////////////////////////

    fn reload(&mut self) {
        let reloader = match self.reloader {
            Some(ref mut reloader) => reloader,
            None => {
                info!("Reload requested, but there is nothing to reload from.");
                return;
            }
        };
        info!("Reloading.");
        match reloader() {
            Ok(settings) => {
                info!("Reloaded; now forwarding queries for {}.", settings.domain);
                self.settings = settings;
            }
            Err(e) => {
                let mut message = String::from("Failed to reload; keeping the old settings:");
                let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&*e);
                let mut i = 1;
                while let Some(err) = cause {
                    let _ = write!(message, "\n[{}] {}", i, err);
                    cause = err.source();
                    i += 1;
                }
                error!("{}", message);
            }
        }
    }

    fn report(&self) {
        let stats = &self.stats;
        let mut message = format!(
            "Report:\n\
             State:       {:?}\n\
             Domain:      {}\n\
             Datagrams:   {} received, {} ignored\n\
             Questions:   {} received, {} rejected\n\
             Connections: {} opened, {} evicted, {} closed, {} failed, {} bytes received\n\
             Open:        {} of {}",
            self.state,
            self.settings.domain,
            stats.datagrams,
            stats.ignored_messages,
            stats.questions,
            stats.rejected_questions,
            stats.connections_opened,
            stats.connections_evicted,
            stats.connections_closed,
            stats.connections_failed,
            stats.bytes_received,
            self.connections.len(),
            self.connections.capacity(),
        );
        for (handle, connection) in self.connections.iter() {
            let _ = write!(message, "\n  {} {}", handle, connection);
        }
        info!("{}", message);
    }

    fn shut_down(&mut self) {
        let closed = self.connections.clear();
        info!(
            "Closing the listener and {} open connection(s).",
            closed.len()
        );
        drop(closed);
        self.listener = None;
        self.state = State::Terminated;
        log::logger().flush();
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

enum ConnectionEnd {
    Closed,
    Failed(io::Error),
}

/// Services the readiness `events` of one connection, returning the
/// number of response bytes read, if any.
fn drive(
    connection: &mut Connection,
    events: PollFlags,
    buf: &mut [u8],
) -> Result<Option<usize>, ConnectionEnd> {
    if events.contains(PollFlags::POLLNVAL) {
        return Err(ConnectionEnd::Failed(io::Error::new(
            io::ErrorKind::Other,
            "invalid descriptor",
        )));
    }
    if events.contains(PollFlags::POLLOUT) {
        connection.on_writable().map_err(ConnectionEnd::Failed)?;
    }
    if events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
        match connection.on_readable(buf).map_err(ConnectionEnd::Failed)? {
            ReadOutcome::Data(n) => return Ok(Some(n)),
            ReadOutcome::Closed => return Err(ConnectionEnd::Closed),
            ReadOutcome::WouldBlock => (),
        }
    }
    Ok(None)
}

/// Logs the resource records following the questions.
fn log_records(mut reader: Reader, header: &Header, len: usize) {
    let sections = [
        ("answer", header.ancount),
        ("authority", header.nscount),
        ("additional", header.arcount),
    ];
    for (section, count) in sections {
        for _ in 0..count {
            match reader.read_rr() {
                Ok(rr) => debug!("{} record: {}", section, rr),
                Err(e) => {
                    debug!("Failed to decode an {} record: {}.", section, e);
                    return;
                }
            }
        }
    }
    if !reader.at_eom() {
        debug!("Ignoring {} trailing octets.", len - reader.cursor());
    }
}

/// Why a question was not forwarded.
#[derive(Debug)]
enum ForwardError {
    Transform(transform::Error),
    Resolve(http::Error),
    Connect(io::Error),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transform(err) => err.fmt(f),
            Self::Resolve(err) => err.fmt(f),
            Self::Connect(err) => write!(f, "failed to connect: {}", err),
        }
    }
}
