use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use breakwater_http::{parse_request, ParseOutcome};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::error_pages::error_response;
use crate::listener::bind_listener;
use crate::router;
use crate::session::ClientSession;
use crate::shutdown::ShutdownFlag;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const CLIENT_IDLE_TIMEOUT_SECS: u64 = 10;
const READ_CHUNK_SIZE: usize = 64 * 1024;

struct Listener {
    socket: TcpListener,
    config_index: usize,
}

struct Client {
    stream: TcpStream,
    session: ClientSession,
    config_index: usize,
}

/// The single-threaded readiness loop. Owns every listening socket and every
/// client session, keyed by token; nothing else holds connection state.
pub struct Server {
    poll: Poll,
    listeners: HashMap<Token, Listener>,
    configs: Vec<ServerConfig>,
    port_map: HashMap<u16, usize>,
    clients: HashMap<Token, Client>,
    next_token: usize,
    shutdown: ShutdownFlag,
    local_addrs: Vec<SocketAddr>,
}

impl Server {
    /// Bind every configured endpoint. Individual bind failures are logged
    /// and skipped; ending up with no listener at all is fatal.
    pub fn new(configs: Vec<ServerConfig>, shutdown: ShutdownFlag) -> Result<Self, ServerError> {
        let poll = Poll::new()?;
        let mut listeners = HashMap::new();
        let mut port_map = HashMap::new();
        let mut local_addrs = Vec::new();
        let mut next_token = 0;

        for (index, config) in configs.iter().enumerate() {
            let mut socket = match bind_listener(&config.host, config.port) {
                Ok(socket) => socket,
                Err(err) => {
                    warn!(
                        host = %config.host,
                        port = config.port,
                        "could not bind listener: {err}"
                    );
                    continue;
                }
            };
            let addr = socket.local_addr()?;
            let token = Token(next_token);
            next_token += 1;
            poll.registry()
                .register(&mut socket, token, Interest::READABLE)?;
            info!(%addr, "listening");
            port_map.insert(addr.port(), index);
            local_addrs.push(addr);
            listeners.insert(
                token,
                Listener {
                    socket,
                    config_index: index,
                },
            );
        }

        if listeners.is_empty() {
            return Err(ServerError::Runtime(
                "no valid listening sockets".to_string(),
            ));
        }

        Ok(Self {
            poll,
            listeners,
            configs,
            port_map,
            clients: HashMap::new(),
            next_token,
            shutdown,
            local_addrs,
        })
    }

    /// Addresses actually bound, in configuration order. Ephemeral ports
    /// (port 0 in the config) show their kernel-assigned value here.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Drive connections until shutdown is requested or the multiplexer
    /// fails. Readiness waits are bounded so the shutdown flag and the
    /// timeout sweep run at least once a second.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(256);

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.close_all();
                return Err(ServerError::Io(err));
            }

            for event in events.iter() {
                if self.shutdown.is_requested() {
                    break;
                }
                let token = event.token();

                if self.listeners.contains_key(&token) {
                    if event.is_readable() {
                        self.accept_clients(token);
                    }
                    continue;
                }
                if !self.clients.contains_key(&token) {
                    continue;
                }

                if event.is_error() {
                    self.remove_client(token);
                    continue;
                }
                if event.is_readable() {
                    self.handle_readable(token);
                    self.raise_write_interest(token);
                }
                if event.is_writable() {
                    self.handle_writable(token);
                }
            }

            self.sweep_timeouts();
        }

        info!("shutdown requested, closing all connections");
        self.close_all();
        Ok(())
    }

    fn accept_clients(&mut self, listener_token: Token) {
        loop {
            if self.shutdown.is_requested() {
                return;
            }

            let accepted = match self.listeners.get(&listener_token) {
                Some(listener) => listener.socket.accept(),
                None => return,
            };
            let (mut stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("accept failed: {err}");
                    return;
                }
            };

            let fallback = match self.listeners.get(&listener_token) {
                Some(listener) => listener.config_index,
                None => return,
            };
            let config_index = stream
                .local_addr()
                .ok()
                .and_then(|addr| self.port_map.get(&addr.port()).copied())
                .unwrap_or(fallback);

            let token = Token(self.next_token);
            self.next_token += 1;
            if let Err(err) = self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
            {
                warn!("failed to register client: {err}");
                continue;
            }

            debug!(client = token.0, %peer, "accepted connection");
            self.clients.insert(
                token,
                Client {
                    stream,
                    session: ClientSession::new(),
                    config_index,
                },
            );
        }
    }

    /// Drain the socket, then run the parse/dispatch pipeline over whatever
    /// accumulated. EOF with a clean buffer still earns the peer a 400
    /// before the connection goes away.
    fn handle_readable(&mut self, token: Token) {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut saw_eof = false;

        loop {
            let client = match self.clients.get_mut(&token) {
                Some(client) => client,
                None => return,
            };
            match client.stream.read(&mut chunk) {
                Ok(0) => {
                    saw_eof = true;
                    break;
                }
                Ok(n) => {
                    client.session.read_buffer.extend_from_slice(&chunk[..n]);
                    client.session.touch();
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(client = token.0, "read failed: {err}");
                    self.remove_client(token);
                    return;
                }
            }
        }

        self.process_read_buffer(token);

        if saw_eof {
            let mut drop_client = false;
            if let Some(client) = self.clients.get_mut(&token) {
                // The peer is gone; whatever we still owe it goes out, then
                // the session closes.
                client.session.keep_alive = false;

                if !client.session.has_pending_write() {
                    if client.session.read_buffer.is_empty() {
                        let config = &self.configs[client.config_index];
                        let response = error_response(400, config);
                        client.session.queue_response(response.to_bytes());
                    } else {
                        // Unparseable leftovers and a closed peer: nothing
                        // left to say.
                        drop_client = true;
                    }
                }
            }
            if drop_client {
                self.remove_client(token);
            }
        }
    }

    /// Parse as many complete pipelined requests as the buffer holds,
    /// queueing their responses in arrival order.
    fn process_read_buffer(&mut self, token: Token) {
        loop {
            let client = match self.clients.get_mut(&token) {
                Some(client) => client,
                None => return,
            };
            if client.session.read_buffer.is_empty() {
                return;
            }
            let config = &self.configs[client.config_index];

            // Oversize bodies are refused from the declared length alone,
            // before the bytes ever arrive.
            if let Some(declared) = declared_content_length(&client.session.read_buffer) {
                if declared > config.max_body_size {
                    let response = error_response(413, config);
                    client.session.keep_alive = false;
                    client.session.append_response(&response.to_bytes());
                    client.session.read_buffer.clear();
                    return;
                }
            }

            match parse_request(&client.session.read_buffer) {
                ParseOutcome::Incomplete => return,
                ParseOutcome::Complete { request, consumed } => {
                    let mut response = router::handle_request(&request, config);
                    let keep_alive = request.is_keep_alive() && !response.is_close();
                    response.set_keep_alive(keep_alive);

                    debug!(
                        method = %request.method,
                        uri = %request.uri,
                        status = response.status_code(),
                        "request served"
                    );

                    client.session.keep_alive = keep_alive;
                    client.session.append_response(&response.to_bytes());
                    client.session.consume_read(consumed);
                    client.session.touch();

                    if !keep_alive {
                        client.session.read_buffer.clear();
                        return;
                    }
                }
                ParseOutcome::Invalid { status, consumed } => {
                    let response = error_response(status, config);
                    client.session.keep_alive = false;
                    client.session.append_response(&response.to_bytes());
                    if consumed > 0 {
                        client.session.consume_read(consumed);
                    } else {
                        client.session.read_buffer.clear();
                    }
                    return;
                }
            }
        }
    }

    /// Push queued bytes out. On a partial send the remainder waits for the
    /// next writable event; on a full drain the session is either recycled
    /// (keep-alive) or closed.
    fn handle_writable(&mut self, token: Token) {
        loop {
            let client = match self.clients.get_mut(&token) {
                Some(client) => client,
                None => return,
            };
            if !client.session.has_pending_write() {
                if client.session.write_buffer.is_empty() {
                    return;
                }
                break;
            }
            match client.stream.write(client.session.unsent()) {
                Ok(0) => {
                    self.remove_client(token);
                    return;
                }
                Ok(n) => {
                    client.session.bytes_sent += n;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(client = token.0, "write failed: {err}");
                    self.remove_client(token);
                    return;
                }
            }
        }

        let keep_alive = match self.clients.get(&token) {
            Some(client) => client.session.keep_alive,
            None => return,
        };
        if keep_alive {
            if let Some(client) = self.clients.get_mut(&token) {
                client.session.reset_for_next_request();
                client.session.touch();
                let _ = self
                    .poll
                    .registry()
                    .reregister(&mut client.stream, token, Interest::READABLE);
            }
        } else {
            self.remove_client(token);
        }
    }

    fn raise_write_interest(&mut self, token: Token) {
        if let Some(client) = self.clients.get_mut(&token) {
            if client.session.has_pending_write() {
                let _ = self.poll.registry().reregister(
                    &mut client.stream,
                    token,
                    Interest::READABLE | Interest::WRITABLE,
                );
            }
        }
    }

    /// Idle connections with nothing in flight get a 400; stalled uploads
    /// whose request is valid but incomplete get a 408. Both are measured
    /// against last activity and delivered before the close.
    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let mut expirations: Vec<(Token, u16)> = Vec::new();

        for (token, client) in &self.clients {
            if !client.session.write_buffer.is_empty() {
                continue;
            }
            if client.session.idle_seconds(now) < CLIENT_IDLE_TIMEOUT_SECS {
                continue;
            }
            if client.session.read_buffer.is_empty() {
                if !client.session.keep_alive {
                    expirations.push((*token, 400));
                }
            } else if matches!(
                parse_request(&client.session.read_buffer),
                ParseOutcome::Incomplete
            ) {
                expirations.push((*token, 408));
            }
        }

        for (token, status) in expirations {
            if let Some(client) = self.clients.get_mut(&token) {
                let config = &self.configs[client.config_index];
                let response = error_response(status, config);
                client.session.keep_alive = false;
                client.session.queue_response(response.to_bytes());
                client.session.read_buffer.clear();
                let _ = self.poll.registry().reregister(
                    &mut client.stream,
                    token,
                    Interest::READABLE | Interest::WRITABLE,
                );
                debug!(client = token.0, status, "timeout response queued");
            }
        }
    }

    fn remove_client(&mut self, token: Token) {
        if let Some(mut client) = self.clients.remove(&token) {
            let _ = self.poll.registry().deregister(&mut client.stream);
            debug!(client = token.0, "closed connection");
        }
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.clients.keys().copied().collect();
        for token in tokens {
            self.remove_client(token);
        }
        for (_, mut listener) in self.listeners.drain() {
            let _ = self.poll.registry().deregister(&mut listener.socket);
        }
    }
}

/// Declared `Content-Length` scanned straight off the buffered header
/// region, available before the request is complete. Duplicate headers keep
/// the last value, matching what the parser will eventually wait for.
fn declared_content_length(buffer: &[u8]) -> Option<usize> {
    let end = buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .unwrap_or(buffer.len());

    let mut declared = None;
    for line in buffer[..end].split(|&byte| byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&byte| byte == b':') else {
            continue;
        };
        if line[..colon].eq_ignore_ascii_case(b"content-length") {
            let value = std::str::from_utf8(&line[colon + 1..]).ok()?;
            declared = value.trim().parse().ok();
        }
    }
    declared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_length_is_found_before_the_body() {
        let buffer = b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 10000\r\n\r\n";
        assert_eq!(declared_content_length(buffer), Some(10000));
    }

    #[test]
    fn declared_length_found_even_without_terminator() {
        let buffer = b"POST /u HTTP/1.1\r\ncontent-length: 42\r\n";
        assert_eq!(declared_content_length(buffer), Some(42));
    }

    #[test]
    fn duplicate_content_length_keeps_the_last_value() {
        let buffer = b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 10\r\nContent-Length: 999999999\r\n\r\n";
        assert_eq!(declared_content_length(buffer), Some(999_999_999));
    }

    #[test]
    fn no_declared_length_without_the_header() {
        assert_eq!(
            declared_content_length(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            None
        );
        assert_eq!(declared_content_length(b"garbage"), None);
    }

    #[test]
    fn body_bytes_are_not_scanned_for_length() {
        let buffer =
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\nContent-Length: 99\r\n";
        assert_eq!(declared_content_length(buffer), None);
    }

    #[test]
    fn server_requires_at_least_one_listener() {
        let config = ServerConfig {
            host: "999.999.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        match Server::new(vec![config], ShutdownFlag::new()) {
            Err(ServerError::Runtime(message)) => {
                assert!(message.contains("no valid listening sockets"));
            }
            Err(other) => panic!("expected runtime error, got {other:?}"),
            Ok(_) => panic!("expected runtime error, got a bound server"),
        }
    }

    #[test]
    fn server_binds_ephemeral_ports() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(vec![config], ShutdownFlag::new()).unwrap();
        assert_eq!(server.local_addrs().len(), 1);
        assert_ne!(server.local_addrs()[0].port(), 0);
    }
}
