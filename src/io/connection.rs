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

//! Outbound connections carrying one HTTP request each.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::Arc;

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::PollFlags;
use nix::sys::socket::{
    connect, socket, AddressFamily, SockFlag, SockProtocol, SockType, SockaddrStorage,
};
use nix::unistd::close;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};

use crate::http::HttpRequest;

/// The outcome of servicing a readable [`Connection`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// This many bytes of the response arrived.
    Data(usize),

    /// The destination closed the connection.
    Closed,

    /// Nothing could be read after all.
    WouldBlock,
}

/// A non-blocking TCP connection (optionally wrapped in TLS) that sends
/// one serialized [`HttpRequest`] and then reads whatever comes back.
pub struct Connection {
    peer: SocketAddr,
    url: String,
    stream: Stream,
    established: bool,
    pending: Vec<u8>,
    written: usize,
    received: usize,
}

enum Stream {
    Plain(TcpStream),
    Tls {
        session: Box<ClientConnection>,
        socket: TcpStream,
    },
}

impl Connection {
    /// Starts connecting to `peer` and queues `request` for sending.
    ///
    /// The connection is wrapped in TLS when `tls` is given, with the
    /// request host as the server name. The call returns before the
    /// connection is established; the outcome of the connection attempt
    /// surfaces on the first [`Connection::on_writable`].
    pub fn open(
        peer: SocketAddr,
        request: &HttpRequest,
        tls: Option<Arc<ClientConfig>>,
    ) -> io::Result<Self> {
        let socket = connect_nonblocking(peer)?;
        let serialized = request.serialize();
        let request_len = serialized.len();
        let (stream, pending) = match tls {
            Some(config) => {
                let server_name = ServerName::try_from(request.host.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let mut session = ClientConnection::new(config, server_name)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

                // The session holds the plaintext until the handshake
                // is done.
                session.writer().write_all(&serialized)?;
                (
                    Stream::Tls {
                        session: Box::new(session),
                        socket,
                    },
                    Vec::new(),
                )
            }
            None => (Stream::Plain(socket), serialized),
        };
        debug!(
            "Opening a connection to {} for {} ({} request bytes).",
            peer,
            request.url(),
            request_len,
        );
        Ok(Self {
            peer,
            url: request.url(),
            stream,
            established: false,
            pending,
            written: 0,
            received: 0,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the number of response bytes read so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Returns the readiness events this connection is waiting for:
    /// always readability, plus writability until the connection is
    /// established and everything queued has been written.
    pub fn interest(&self) -> PollFlags {
        let wants_write = !self.established
            || match self.stream {
                Stream::Plain(_) => self.written < self.pending.len(),
                Stream::Tls { ref session, .. } => session.wants_write(),
            };
        if wants_write {
            PollFlags::POLLIN | PollFlags::POLLOUT
        } else {
            PollFlags::POLLIN
        }
    }

    /// Services writability: completes the connection attempt on the
    /// first call, then writes as much of the request as the socket
    /// accepts.
    pub fn on_writable(&mut self) -> io::Result<()> {
        if !self.established {
            if let Some(err) = self.socket().take_error()? {
                return Err(err);
            }
            self.established = true;
            debug!("Connected to {} for {}.", self.peer, self.url);
        }

        match self.stream {
            Stream::Plain(ref mut socket) => {
                while self.written < self.pending.len() {
                    match socket.write(&self.pending[self.written..]) {
                        Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                        Ok(n) => self.written += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }
            }
            Stream::Tls {
                ref mut session,
                ref mut socket,
            } => {
                while session.wants_write() {
                    match session.write_tls(socket) {
                        Ok(_) => (),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Services readability, reading into `buf` (whose contents are
    /// then discarded by the caller).
    pub fn on_readable(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let outcome = match self.stream {
            Stream::Plain(ref mut socket) => match socket.read(buf) {
                Ok(0) => ReadOutcome::Closed,
                Ok(n) => ReadOutcome::Data(n),
                Err(e) if is_transient(&e) => ReadOutcome::WouldBlock,
                Err(e) => return Err(e),
            },
            Stream::Tls {
                ref mut session,
                ref mut socket,
            } => read_tls(session, socket, buf)?,
        };
        if let ReadOutcome::Data(n) = outcome {
            self.received += n;
        }
        Ok(outcome)
    }

    fn socket(&self) -> &TcpStream {
        match self.stream {
            Stream::Plain(ref socket) => socket,
            Stream::Tls { ref socket, .. } => socket,
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.socket().as_raw_fd()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} via {} ({}, {} bytes received)",
            self.url,
            self.peer,
            if self.established {
                "established"
            } else {
                "connecting"
            },
            self.received,
        )
    }
}

/// Moves ciphertext from the socket into the session and drains all
/// plaintext that became available. Everything is drained at once since
/// buffered plaintext does not make the socket readable again.
fn read_tls(
    session: &mut ClientConnection,
    socket: &mut TcpStream,
    buf: &mut [u8],
) -> io::Result<ReadOutcome> {
    match session.read_tls(socket) {
        Ok(0) => return Ok(ReadOutcome::Closed),
        Ok(_) => (),
        Err(e) if is_transient(&e) => (),
        Err(e) => return Err(e),
    }
    session
        .process_new_packets()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut total = 0;
    loop {
        match session.reader().read(buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(if total > 0 {
                    ReadOutcome::Data(total)
                } else {
                    ReadOutcome::WouldBlock
                });
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    // The peer ended the TLS stream.
    Ok(if total > 0 {
        ReadOutcome::Data(total)
    } else {
        ReadOutcome::Closed
    })
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Creates a non-blocking TCP socket and starts connecting it to
/// `peer`.
fn connect_nonblocking(peer: SocketAddr) -> io::Result<TcpStream> {
    let family = if peer.is_ipv6() {
        AddressFamily::Inet6
    } else {
        AddressFamily::Inet
    };
    let fd = socket(
        family,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::Tcp,
    )?;

    if let Err(e) = fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)) {
        let _ = close(fd);
        return Err(e.into());
    }

    let sock_addr = SockaddrStorage::from(peer);
    match connect(fd, &sock_addr) {
        Ok(()) | Err(Errno::EINPROGRESS) | Err(Errno::EINTR) => (),
        Err(e) => {
            let _ = close(fd);
            return Err(e.into());
        }
    }

    // SAFETY: fd is a socket we just created and nothing else owns it.
    Ok(unsafe { TcpStream::from_raw_fd(fd) })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use nix::poll::{poll, PollFd};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn wait_for(connection: &Connection, events: PollFlags) -> PollFlags {
        let mut poll_fds = [PollFd::new(connection.as_raw_fd(), events)];
        poll(&mut poll_fds, 5000).unwrap();
        poll_fds[0].revents().unwrap()
    }

    #[test]
    fn request_is_delivered_and_close_is_seen() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = listener.local_addr().unwrap();
        let mut request = HttpRequest {
            method: Method::Post,
            host: "127.0.0.1".into(),
            port: peer.port(),
            ..Default::default()
        };
        request.form.insert("q".into(), "abc".into());
        let expected = request.serialize();

        let mut connection = Connection::open(peer, &request, None).unwrap();
        assert!(connection.interest().contains(PollFlags::POLLOUT));
        let (mut accepted, _) = listener.accept().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while connection.interest().contains(PollFlags::POLLOUT) {
            assert!(Instant::now() < deadline);
            wait_for(&connection, PollFlags::POLLOUT);
            connection.on_writable().unwrap();
        }
        assert_eq!(connection.interest(), PollFlags::POLLIN);

        let mut received = vec![0; expected.len()];
        accepted.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);

        accepted.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        drop(accepted);

        let mut buf = [0; 256];
        let mut total = 0;
        loop {
            assert!(Instant::now() < deadline);
            wait_for(&connection, PollFlags::POLLIN);
            match connection.on_readable(&mut buf).unwrap() {
                ReadOutcome::Data(n) => total += n,
                ReadOutcome::WouldBlock => continue,
                ReadOutcome::Closed => break,
            }
        }
        assert_eq!(total, 27);
        assert_eq!(connection.received(), 27);
    }

    #[test]
    fn refused_connections_fail() {
        // Grab a free port, then stop listening on it.
        let peer = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let request = HttpRequest::default();
        let mut connection = match Connection::open(peer, &request, None) {
            Ok(connection) => connection,
            Err(_) => return,
        };
        wait_for(&connection, PollFlags::POLLOUT);
        assert!(connection.on_writable().is_err());
    }
}
