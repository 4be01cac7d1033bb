//! Peer-to-peer transport abstraction.
//!
//! The session layer only needs a reliable, ordered, line-framed message
//! channel per connection pair with connect/open/data/close events. The
//! production implementation is non-blocking TCP on localhost-or-LAN
//! addresses; tests use an in-process hub with identical event semantics so
//! multi-peer protocol interleavings can be driven step by step.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use world::PlayerId;

const MAX_PENDING_BYTES_PER_CONN: usize = 256 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind local endpoint: {0}")]
    Bind(#[source] io::Error),
    #[error("peer address {addr} is not reachable: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("peer identifier {0} is not a valid address")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection finished opening. `peer` is known for outbound and
    /// hub-mediated connections; inbound TCP peers identify themselves at the
    /// protocol level instead.
    Opened { conn: ConnId, peer: Option<PlayerId> },
    Data { conn: ConnId, line: String },
    Closed { conn: ConnId },
}

pub trait Transport {
    fn local_id(&self) -> Option<&PlayerId>;
    fn connect(&mut self, target: &PlayerId) -> Result<ConnId, TransportError>;
    /// Best-effort. Lines to closed or backlogged connections are dropped.
    fn send(&mut self, conn: ConnId, line: &str);
    fn close(&mut self, conn: ConnId);
    fn poll(&mut self, out: &mut Vec<TransportEvent>);
}

// --- TCP implementation ---------------------------------------------------

struct TcpConn {
    stream: TcpStream,
    read_buf: Vec<u8>,
    active_chunk: Option<(Vec<u8>, usize)>,
    queued_chunks: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    announced: bool,
    peer: Option<PlayerId>,
}

pub struct TcpTransport {
    listener: TcpListener,
    local_id: PlayerId,
    conns: HashMap<ConnId, TcpConn>,
    next_conn: u64,
}

impl TcpTransport {
    /// Binds `127.0.0.1:port` (0 picks a free port). The bound address is the
    /// peer's public identifier.
    pub fn bind(port: u16) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(("127.0.0.1", port)).map_err(TransportError::Bind)?;
        listener.set_nonblocking(true).map_err(TransportError::Bind)?;
        let addr = listener.local_addr().map_err(TransportError::Bind)?;
        Ok(Self {
            listener,
            local_id: PlayerId(addr.to_string()),
            conns: HashMap::new(),
            next_conn: 1,
        })
    }

    fn register(&mut self, stream: TcpStream, peer: Option<PlayerId>) -> ConnId {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;
        self.conns.insert(
            conn,
            TcpConn {
                stream,
                read_buf: Vec::new(),
                active_chunk: None,
                queued_chunks: VecDeque::new(),
                queued_bytes: 0,
                announced: false,
                peer,
            },
        );
        conn
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(error) = stream.set_nonblocking(true) {
                        warn!(%error, "transport_accept_nonblocking_failed");
                        continue;
                    }
                    if let Err(error) = stream.set_nodelay(true) {
                        warn!(%error, "transport_accept_nodelay_failed");
                    }
                    self.register(stream, None);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(%error, "transport_accept_failed");
                    break;
                }
            }
        }
    }

    fn poll_conn(conn: &mut TcpConn, id: ConnId, out: &mut Vec<TransportEvent>) -> bool {
        let mut chunk = [0u8; 1024];
        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => return false,
                Ok(bytes_read) => {
                    conn.read_buf.extend_from_slice(&chunk[..bytes_read]);
                    drain_complete_lines(&mut conn.read_buf, id, out);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return true,
                Err(error) => {
                    debug!(%error, "transport_read_failed");
                    return false;
                }
            }
        }
    }

    fn flush_conn(conn: &mut TcpConn) -> bool {
        loop {
            if conn.active_chunk.is_none() {
                match conn.queued_chunks.pop_front() {
                    Some(bytes) => {
                        conn.queued_bytes = conn.queued_bytes.saturating_sub(bytes.len());
                        conn.active_chunk = Some((bytes, 0));
                    }
                    None => return true,
                }
            }
            let Some((bytes, written)) = conn.active_chunk.as_mut() else {
                return true;
            };
            match conn.stream.write(&bytes[*written..]) {
                Ok(0) => return false,
                Ok(count) => {
                    *written += count;
                    if *written >= bytes.len() {
                        conn.active_chunk = None;
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return true,
                Err(error) => {
                    debug!(%error, "transport_write_failed");
                    return false;
                }
            }
        }
    }
}

impl Transport for TcpTransport {
    fn local_id(&self) -> Option<&PlayerId> {
        Some(&self.local_id)
    }

    fn connect(&mut self, target: &PlayerId) -> Result<ConnId, TransportError> {
        let addr: SocketAddr = target
            .0
            .parse()
            .map_err(|_| TransportError::InvalidAddress(target.0.clone()))?;
        let stream =
            TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
                TransportError::Connect {
                    addr: target.0.clone(),
                    source,
                }
            })?;
        stream.set_nonblocking(true).map_err(TransportError::Bind)?;
        if let Err(error) = stream.set_nodelay(true) {
            warn!(%error, "transport_connect_nodelay_failed");
        }
        Ok(self.register(stream, Some(target.clone())))
    }

    fn send(&mut self, conn: ConnId, line: &str) {
        let Some(state) = self.conns.get_mut(&conn) else {
            return;
        };
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        if state.queued_bytes + bytes.len() > MAX_PENDING_BYTES_PER_CONN {
            warn!(conn = conn.0, "transport_send_backlogged_dropped");
            return;
        }
        state.queued_bytes += bytes.len();
        state.queued_chunks.push_back(bytes);
    }

    fn close(&mut self, conn: ConnId) {
        if let Some(mut state) = self.conns.remove(&conn) {
            let _ = Self::flush_conn(&mut state);
            let _ = state.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn poll(&mut self, out: &mut Vec<TransportEvent>) {
        self.accept_pending();
        let mut dead = Vec::new();
        for (&id, conn) in &mut self.conns {
            if !conn.announced {
                conn.announced = true;
                out.push(TransportEvent::Opened {
                    conn: id,
                    peer: conn.peer.clone(),
                });
            }
            let alive = Self::poll_conn(conn, id, out) && Self::flush_conn(conn);
            if !alive {
                dead.push(id);
            }
        }
        for id in dead {
            self.conns.remove(&id);
            out.push(TransportEvent::Closed { conn: id });
        }
    }
}

fn drain_complete_lines(read_buf: &mut Vec<u8>, conn: ConnId, out: &mut Vec<TransportEvent>) {
    while let Some(newline_at) = read_buf.iter().position(|&b| b == b'\n') {
        let mut line_bytes: Vec<u8> = read_buf.drain(..=newline_at).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        match String::from_utf8(line_bytes) {
            Ok(line) if !line.is_empty() => out.push(TransportEvent::Data { conn, line }),
            Ok(_) => {}
            Err(error) => debug!(%error, "transport_non_utf8_line_dropped"),
        }
    }
}

// --- In-memory implementation (tests) -------------------------------------

#[derive(Default)]
struct EndpointState {
    pending: Vec<TransportEvent>,
    links: HashMap<ConnId, (PlayerId, ConnId)>,
}

#[derive(Default)]
struct HubState {
    endpoints: HashMap<PlayerId, EndpointState>,
    next_conn: u64,
}

/// In-process message hub. Delivery is reliable and ordered per connection,
/// applied on the receiving endpoint's next `poll`, which lets tests
/// interleave "network" delivery with local ticks deterministically.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, id: &str) -> MemoryTransport {
        let peer = PlayerId(id.to_string());
        self.lock().endpoints.entry(peer.clone()).or_default();
        MemoryTransport {
            hub: self.clone(),
            local: peer,
        }
    }

    fn lock(&self) -> std::cell::RefMut<'_, HubState> {
        self.state.borrow_mut()
    }
}

pub struct MemoryTransport {
    hub: MemoryHub,
    local: PlayerId,
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> Option<&PlayerId> {
        Some(&self.local)
    }

    fn connect(&mut self, target: &PlayerId) -> Result<ConnId, TransportError> {
        let mut hub = self.hub.lock();
        if !hub.endpoints.contains_key(target) {
            return Err(TransportError::InvalidAddress(target.0.clone()));
        }
        let local_conn = ConnId(hub.next_conn);
        let remote_conn = ConnId(hub.next_conn + 1);
        hub.next_conn += 2;

        let local_endpoint = hub.endpoints.entry(self.local.clone()).or_default();
        local_endpoint
            .links
            .insert(local_conn, (target.clone(), remote_conn));
        local_endpoint.pending.push(TransportEvent::Opened {
            conn: local_conn,
            peer: Some(target.clone()),
        });

        let remote_endpoint = hub.endpoints.entry(target.clone()).or_default();
        remote_endpoint
            .links
            .insert(remote_conn, (self.local.clone(), local_conn));
        remote_endpoint.pending.push(TransportEvent::Opened {
            conn: remote_conn,
            peer: Some(self.local.clone()),
        });

        Ok(local_conn)
    }

    fn send(&mut self, conn: ConnId, line: &str) {
        let mut hub = self.hub.lock();
        let Some((remote_id, remote_conn)) = hub
            .endpoints
            .get(&self.local)
            .and_then(|endpoint| endpoint.links.get(&conn).cloned())
        else {
            return;
        };
        if let Some(remote) = hub.endpoints.get_mut(&remote_id) {
            remote.pending.push(TransportEvent::Data {
                conn: remote_conn,
                line: line.to_string(),
            });
        }
    }

    fn close(&mut self, conn: ConnId) {
        let mut hub = self.hub.lock();
        let Some((remote_id, remote_conn)) = hub
            .endpoints
            .get_mut(&self.local)
            .and_then(|endpoint| endpoint.links.remove(&conn))
        else {
            return;
        };
        if let Some(remote) = hub.endpoints.get_mut(&remote_id) {
            remote.links.remove(&remote_conn);
            remote
                .pending
                .push(TransportEvent::Closed { conn: remote_conn });
        }
    }

    fn poll(&mut self, out: &mut Vec<TransportEvent>) {
        let mut hub = self.hub.lock();
        if let Some(endpoint) = hub.endpoints.get_mut(&self.local) {
            out.append(&mut endpoint.pending);
        }
    }
}
