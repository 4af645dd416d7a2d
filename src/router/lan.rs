//! # LAN Peer Channel
//!
//! [`PeerChannel`] over the local network: mDNS for advertising and
//! browsing, TCP for sessions.
//!
//! ## Discovery
//!
//! Each relay registers `<name>._t02-share._tcp.local.` with TXT records
//! `role` (`host` / `client`) and `name`. Browsing reports every other relay
//! as [`PeerEvent::Found`] with its advertised role.
//!
//! ## Sessions
//!
//! ```text
//! inviter                         listener
//!    │── hello {name, role} ─────────►│
//!    │◄──────── hello {name, role} ───│
//!    │══ frames (u32 LE len + bytes) ═│
//! ```
//!
//! Both sides check the other's hello: a session is only kept between a
//! client and a host. A send resolves once the frame has been flushed to
//! the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::peer::{PeerChannel, PeerEvent, PeerEventSender, PeerId, PeerState};
use super::role::Role;
use crate::error::{RelayError, Result};

/// mDNS service type for relays.
pub const SERVICE_TYPE: &str = "_t02-share._tcp.local.";

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Hello {
    name: String,
    role: Role,
}

struct Outgoing {
    payload: Vec<u8>,
    ack: oneshot::Sender<std::io::Result<()>>,
}

#[derive(Clone)]
struct Session {
    outbox: mpsc::UnboundedSender<Outgoing>,
    closed: Arc<Notify>,
}

type Sessions = Arc<Mutex<HashMap<PeerId, Session>>>;

struct Running {
    hello: Hello,
    fullname: String,
    tasks: Vec<JoinHandle<()>>,
}

/// mDNS + TCP peer channel.
pub struct LanPeerChannel {
    daemon: ServiceDaemon,
    port: u16,
    events: PeerEventSender,
    sessions: Sessions,
    addresses: Arc<Mutex<HashMap<PeerId, SocketAddr>>>,
    running: Mutex<Option<Running>>,
}

impl LanPeerChannel {
    /// `port` 0 picks a free port on every start.
    pub fn new(port: u16, events: PeerEventSender) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| RelayError::Transport(format!("failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            daemon,
            port,
            events,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            addresses: Arc::new(Mutex::new(HashMap::new())),
            running: Mutex::new(None),
        })
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn advertise(&self, hello: &Hello, port: u16) -> std::result::Result<String, String> {
        let host = format!("{}.local.", host_label(&hello.name));
        let properties = [("role", hello.role.as_str()), ("name", hello.name.as_str())];
        let info = ServiceInfo::new(SERVICE_TYPE, &hello.name, &host, "", port, &properties[..])
            .map_err(|e| e.to_string())?
            .enable_addr_auto();
        let fullname = info.get_fullname().to_string();
        self.daemon.register(info).map_err(|e| e.to_string())?;
        Ok(fullname)
    }
}

#[async_trait]
impl PeerChannel for LanPeerChannel {
    async fn start(&self, role: Role, name: &str) -> Result<()> {
        self.stop().await?;

        let hello = Hello {
            name: name.to_string(),
            role,
        };

        let listener = match TcpListener::bind(("0.0.0.0", self.port)).await {
            Ok(l) => l,
            Err(e) => {
                self.emit(PeerEvent::AdvertiseFailed(e.to_string()));
                return Err(RelayError::Transport(format!("peer listener: {e}")));
            }
        };
        let port = listener.local_addr()?.port();

        let fullname = match self.advertise(&hello, port) {
            Ok(fullname) => fullname,
            Err(e) => {
                warn!(error = %e, "mDNS register failed");
                self.emit(PeerEvent::AdvertiseFailed(e));
                String::new()
            }
        };

        let mut tasks = vec![tokio::spawn(accept_loop(
            listener,
            hello.clone(),
            Arc::clone(&self.sessions),
            self.events.clone(),
        ))];

        match self.daemon.browse(SERVICE_TYPE) {
            Ok(receiver) => tasks.push(tokio::spawn(browse_loop(
                receiver,
                fullname.clone(),
                Arc::clone(&self.addresses),
                self.events.clone(),
            ))),
            Err(e) => {
                warn!(error = %e, "mDNS browse failed");
                self.emit(PeerEvent::BrowseFailed(e.to_string()));
            }
        }

        info!(name = %hello.name, role = %hello.role, port, "Peer services started");
        *self.running.lock().await = Some(Running {
            hello,
            fullname,
            tasks,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        if !running.fullname.is_empty() {
            if let Err(e) = self.daemon.unregister(&running.fullname) {
                debug!(error = %e, "mDNS unregister failed");
            }
        }
        let _ = self.daemon.stop_browse(SERVICE_TYPE);
        for task in running.tasks {
            task.abort();
        }

        let dropped: Vec<(PeerId, Session)> = self.sessions.lock().await.drain().collect();
        for (peer, session) in dropped {
            session.closed.notify_one();
            self.emit(PeerEvent::StateChanged {
                peer,
                state: PeerState::NotConnected,
            });
        }
        self.addresses.lock().await.clear();
        debug!("Peer services stopped");
        Ok(())
    }

    async fn invite(&self, peer: &PeerId) -> Result<()> {
        if self.sessions.lock().await.contains_key(peer) {
            return Ok(());
        }
        let addr = self
            .addresses
            .lock()
            .await
            .get(peer)
            .copied()
            .ok_or_else(|| RelayError::PeerSend(format!("no address for {}", peer)))?;
        let hello = match self.running.lock().await.as_ref() {
            Some(running) => running.hello.clone(),
            None => return Err(RelayError::PeerSend("peer services are stopped".to_string())),
        };

        self.emit(PeerEvent::StateChanged {
            peer: peer.clone(),
            state: PeerState::Connecting,
        });

        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();
        let expected = peer.clone();
        tokio::spawn(async move {
            match invite_session(addr, &hello, &expected).await {
                Ok(stream) => run_connection(stream, expected, sessions, events).await,
                Err(e) => {
                    warn!(peer = %expected, error = %e, "Peer connection failed");
                    let _ = events.send(PeerEvent::StateChanged {
                        peer: expected,
                        state: PeerState::NotConnected,
                    });
                }
            }
        });
        Ok(())
    }

    async fn send(&self, peers: &[PeerId], payload: &[u8]) -> Result<()> {
        if peers.is_empty() {
            return Err(RelayError::PeerSend("no peers connected".to_string()));
        }
        for peer in peers {
            let session = self
                .sessions
                .lock()
                .await
                .get(peer)
                .cloned()
                .ok_or_else(|| RelayError::PeerSend(format!("{} is not connected", peer)))?;
            let (ack, done) = oneshot::channel();
            session
                .outbox
                .send(Outgoing {
                    payload: payload.to_vec(),
                    ack,
                })
                .map_err(|_| RelayError::PeerSend(format!("session with {} closed", peer)))?;
            done.await
                .map_err(|_| RelayError::PeerSend(format!("session with {} closed", peer)))?
                .map_err(|e| RelayError::PeerSend(e.to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tasks
// ============================================================================

async fn browse_loop(
    receiver: mdns_sd::Receiver<ServiceEvent>,
    own_fullname: String,
    addresses: Arc<Mutex<HashMap<PeerId, SocketAddr>>>,
    events: PeerEventSender,
) {
    let mut names: HashMap<String, PeerId> = HashMap::new();
    while let Ok(event) = receiver.recv_async().await {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let fullname = info.get_fullname().to_string();
                if fullname == own_fullname {
                    continue;
                }
                let Some(role) = info.get_property_val_str("role").and_then(Role::from_name) else {
                    debug!(name = %fullname, "Relay without a role record");
                    continue;
                };
                let name = info
                    .get_property_val_str("name")
                    .map(str::to_string)
                    .unwrap_or_else(|| instance_name(&fullname));
                let Some(ip) = info
                    .get_addresses()
                    .iter()
                    .find(|a| a.is_ipv4())
                    .or_else(|| info.get_addresses().iter().next())
                    .copied()
                else {
                    debug!(name = %fullname, "Relay without an address");
                    continue;
                };

                let peer = PeerId::new(name);
                addresses
                    .lock()
                    .await
                    .insert(peer.clone(), SocketAddr::new(ip, info.get_port()));
                names.insert(fullname, peer.clone());
                debug!(peer = %peer, role = %role, "Relay found");
                let _ = events.send(PeerEvent::Found { peer, role });
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                if let Some(peer) = names.remove(&fullname) {
                    addresses.lock().await.remove(&peer);
                    let _ = events.send(PeerEvent::Lost { peer });
                }
            }
            ServiceEvent::SearchStopped(_) => break,
            _ => {}
        }
    }
}

async fn accept_loop(listener: TcpListener, hello: Hello, sessions: Sessions, events: PeerEventSender) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hello = hello.clone();
                let sessions = Arc::clone(&sessions);
                let events = events.clone();
                tokio::spawn(async move {
                    match accept_session(stream, &hello).await {
                        Ok((stream, remote)) => {
                            run_connection(stream, PeerId::new(remote.name), sessions, events).await;
                        }
                        Err(e) => debug!(addr = %addr, error = %e, "Peer handshake failed"),
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Peer listener stopped");
                break;
            }
        }
    }
}

async fn connect_session(addr: SocketAddr, hello: &Hello) -> std::io::Result<(TcpStream, Hello)> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, &encode_hello(hello)?).await?;
    let remote = decode_hello(&read_frame(&mut stream).await?)?;
    check_pairing(hello, &remote)?;
    Ok((stream, remote))
}

/// Open a session with the relay advertised as `expected`. A relay that
/// answers under another name is refused.
async fn invite_session(addr: SocketAddr, hello: &Hello, expected: &PeerId) -> std::io::Result<TcpStream> {
    let (stream, remote) = connect_session(addr, hello).await?;
    if remote.name != expected.0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("peer answered as {}", remote.name),
        ));
    }
    Ok(stream)
}

async fn accept_session(mut stream: TcpStream, hello: &Hello) -> std::io::Result<(TcpStream, Hello)> {
    let remote = decode_hello(&read_frame(&mut stream).await?)?;
    check_pairing(hello, &remote)?;
    write_frame(&mut stream, &encode_hello(hello)?).await?;
    Ok((stream, remote))
}

fn check_pairing(local: &Hello, remote: &Hello) -> std::io::Result<()> {
    if local.role.pairs_with(remote.role) {
        return Ok(());
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        format!("{} {} cannot pair with {} {}", local.role, local.name, remote.role, remote.name),
    ))
}

async fn run_connection(stream: TcpStream, peer: PeerId, sessions: Sessions, events: PeerEventSender) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
    let closed = Arc::new(Notify::new());
    let session = Session {
        outbox: tx,
        closed: Arc::clone(&closed),
    };
    if let Some(old) = sessions.lock().await.insert(peer.clone(), session) {
        old.closed.notify_one();
    }
    info!(peer = %peer, "Peer connected");
    let _ = events.send(PeerEvent::StateChanged {
        peer: peer.clone(),
        state: PeerState::Connected,
    });

    let (mut reader, mut writer) = stream.into_split();
    let writer_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let result = write_frame(&mut writer, &out.payload).await;
            let failed = result.is_err();
            let _ = out.ack.send(result);
            if failed {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = closed.notified() => break,
            frame = read_frame(&mut reader) => match frame {
                Ok(payload) => {
                    debug!(peer = %peer, bytes = payload.len(), "Peer payload");
                    let _ = events.send(PeerEvent::Received { peer: peer.clone(), payload });
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Peer session ended");
                    break;
                }
            },
        }
    }
    writer_task.abort();

    let mut map = sessions.lock().await;
    let ours = map
        .get(&peer)
        .is_some_and(|s| Arc::ptr_eq(&s.closed, &closed));
    if ours {
        map.remove(&peer);
        drop(map);
        info!(peer = %peer, "Peer disconnected");
        let _ = events.send(PeerEvent::StateChanged {
            peer,
            state: PeerState::NotConnected,
        });
    }
}

// ============================================================================
// Framing
// ============================================================================

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame too large",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

fn encode_hello(hello: &Hello) -> std::io::Result<Vec<u8>> {
    serde_json::to_vec(hello).map_err(std::io::Error::other)
}

fn decode_hello(bytes: &[u8]) -> std::io::Result<Hello> {
    serde_json::from_slice(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// `Kitchen Pad._t02-share._tcp.local.` → `Kitchen Pad`
fn instance_name(fullname: &str) -> String {
    fullname
        .strip_suffix(SERVICE_TYPE)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// DNS-safe host label for a display name.
fn host_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "t02relay".to_string()
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip_over_pipe() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"[[27,64]]").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap(), b"[[27,64]]");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(MAX_FRAME_LEN + 1).to_le_bytes()).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        assert!(read_frame(&mut b).await.is_err());
    }

    #[test]
    fn test_hello_json() {
        let hello = Hello {
            name: "Kitchen".to_string(),
            role: Role::Host,
        };
        let bytes = encode_hello(&hello).unwrap();
        assert_eq!(bytes, br#"{"name":"Kitchen","role":"host"}"#);
        assert_eq!(decode_hello(&bytes).unwrap(), hello);
    }

    #[test]
    fn test_names() {
        assert_eq!(instance_name("Kitchen Pad._t02-share._tcp.local."), "Kitchen Pad");
        assert_eq!(host_label("Kitchen Pad!"), "Kitchen-Pad");
        assert_eq!(host_label("  "), "t02relay");
    }

    #[tokio::test]
    async fn test_handshake_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host = Hello {
            name: "host".to_string(),
            role: Role::Host,
        };
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_session(stream, &host).await.unwrap().1
        });

        let client = Hello {
            name: "client".to_string(),
            role: Role::Client,
        };
        let (_, remote) = connect_session(addr, &client).await.unwrap();
        assert_eq!(remote.role, Role::Host);
        assert_eq!(server.await.unwrap(), client);
    }

    #[tokio::test]
    async fn test_invite_refuses_renamed_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host = Hello {
            name: "pantry".to_string(),
            role: Role::Host,
        };
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = accept_session(stream, &host).await;
        });

        let client = Hello {
            name: "phone".to_string(),
            role: Role::Client,
        };
        let err = invite_session(addr, &client, &PeerId::new("kitchen"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_client_to_client_handshake_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let listening = Hello {
            name: "tablet".to_string(),
            role: Role::Client,
        };
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_session(stream, &listening).await.map(|(_, remote)| remote)
        });

        let phone = Hello {
            name: "phone".to_string(),
            role: Role::Client,
        };
        assert!(connect_session(addr, &phone).await.is_err());
        let refused = server.await.unwrap().unwrap_err();
        assert_eq!(refused.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
