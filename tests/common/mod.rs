//! In-memory radio, peer channel and cloud queue for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use t02relay::RelayError;
use t02relay::config::RelayConfig;
use t02relay::error::Result;
use t02relay::logging::RecentLogs;
use t02relay::relay::Relay;
use t02relay::router::{
    CloudDocument, CloudQueue, JobRouter, PeerChannel, PeerEvent, PeerEventSender, PeerId,
    PeerState, RenderKind, Role, RouterHandle, RouterSettings, peer_channel,
};
use t02relay::transport::{
    DeviceId, LinkEvent, LinkEventSender, LinkHandle, LinkManager, LinkSettings, LinkState,
    Peripheral, Radio, WriteCharacteristic, event_channel,
};

pub const PRINTER_MAC: &str = "AA:BB:CC:DD:EE:FF";

// ============================================================================
// Radio
// ============================================================================

pub struct MockRadio {
    events: LinkEventSender,
    pub target: Peripheral,
    pub write_size: usize,
    /// Report `Connected` as soon as `connect` is called
    pub auto_connect: AtomicBool,
    /// Report the target from `start_scan`
    pub discoverable: AtomicBool,
    pub fail_writes: AtomicBool,
    /// `connect` never returns, like an open on an unreachable device
    pub hang_connect: AtomicBool,
    pub system_connected: Mutex<Vec<Peripheral>>,
    pub calls: Mutex<Vec<String>>,
    pub chunks: Mutex<Vec<Vec<u8>>>,
}

impl MockRadio {
    pub fn new(events: LinkEventSender, write_size: usize) -> Self {
        Self {
            events,
            target: Peripheral::new(PRINTER_MAC, Some("T02".to_string())),
            write_size,
            auto_connect: AtomicBool::new(true),
            discoverable: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            hang_connect: AtomicBool::new(false),
            system_connected: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    /// Finish a pending connect.
    pub fn complete_connect(&self) {
        self.emit(LinkEvent::Connected(self.target.id.clone()));
    }

    pub fn drop_link(&self) {
        self.emit(LinkEvent::Disconnected {
            device: self.target.id.clone(),
            reason: Some("out of range".to_string()),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<u8> {
        self.chunks().concat()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn connected_peripherals(&self) -> Result<Vec<Peripheral>> {
        Ok(self.system_connected.lock().unwrap().clone())
    }

    async fn start_scan(&self) -> Result<()> {
        self.record("start_scan");
        if self.discoverable.load(Ordering::SeqCst) {
            self.emit(LinkEvent::Discovered(self.target.clone()));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record("stop_scan");
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        self.record("connect");
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.auto_connect.load(Ordering::SeqCst) {
            self.emit(LinkEvent::Connected(peripheral.id.clone()));
        }
        Ok(())
    }

    async fn cancel_connect(&self, _device: &DeviceId) -> Result<()> {
        self.record("cancel_connect");
        Ok(())
    }

    async fn discover_write_characteristic(&self, device: &DeviceId) -> Result<()> {
        self.record("discover");
        self.emit(LinkEvent::CharacteristicFound(WriteCharacteristic {
            device: device.clone(),
            uuid: "FF02".to_string(),
            max_write_size: self.write_size,
        }));
        Ok(())
    }

    async fn write(&self, _characteristic: &WriteCharacteristic, chunk: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("write rejected".to_string()));
        }
        self.chunks.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }
}

/// Spawn a link over a fresh mock radio. The radio is not powered yet.
pub fn spawn_link(write_size: usize) -> (Arc<MockRadio>, LinkHandle) {
    let (tx, rx) = event_channel();
    let radio = Arc::new(MockRadio::new(tx.clone(), write_size));
    let link = LinkManager::spawn(Arc::clone(&radio), (tx, rx), LinkSettings::default());
    (radio, link)
}

/// Wait until the link reaches `state`.
pub async fn wait_for_state(link: &LinkHandle, state: LinkState) {
    let mut rx = link.subscribe();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| s.state == state))
        .await
        .expect("link state not reached")
        .expect("link manager stopped");
}

/// Poll `f` until it holds.
pub async fn wait_until<F: FnMut() -> bool>(mut f: F) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Power on a connectable radio and wait for `Ready`.
pub async fn ready_link(write_size: usize) -> (Arc<MockRadio>, LinkHandle) {
    let (radio, link) = spawn_link(write_size);
    radio.emit(LinkEvent::RadioPoweredOn);
    wait_for_state(&link, LinkState::Ready).await;
    (radio, link)
}

// ============================================================================
// Peer channel
// ============================================================================

pub struct MockPeerChannel {
    events: PeerEventSender,
    /// Report a session as soon as a peer is invited
    pub accept_invites: AtomicBool,
    pub fail_sends: AtomicBool,
    pub starts: Mutex<Vec<(Role, String)>>,
    pub invites: Mutex<Vec<PeerId>>,
    pub sent: Mutex<Vec<(Vec<PeerId>, Vec<u8>)>>,
}

impl MockPeerChannel {
    pub fn new(events: PeerEventSender) -> Self {
        Self {
            events,
            accept_invites: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            starts: Mutex::new(Vec::new()),
            invites: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn starts(&self) -> Vec<(Role, String)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<PeerId> {
        self.invites.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(Vec<PeerId>, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerChannel for MockPeerChannel {
    async fn start(&self, role: Role, name: &str) -> Result<()> {
        self.starts.lock().unwrap().push((role, name.to_string()));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn invite(&self, peer: &PeerId) -> Result<()> {
        self.invites.lock().unwrap().push(peer.clone());
        self.emit(PeerEvent::StateChanged {
            peer: peer.clone(),
            state: PeerState::Connecting,
        });
        if self.accept_invites.load(Ordering::SeqCst) {
            self.emit(PeerEvent::StateChanged {
                peer: peer.clone(),
                state: PeerState::Connected,
            });
        }
        Ok(())
    }

    async fn send(&self, peers: &[PeerId], payload: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::PeerSend("session closed".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((peers.to_vec(), payload.to_vec()));
        Ok(())
    }
}

// ============================================================================
// Cloud queue
// ============================================================================

#[derive(Default)]
pub struct MockCloud {
    pub documents: Mutex<VecDeque<CloudDocument>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockCloud {
    pub fn push(&self, id: &str, data: &str, kind: RenderKind) {
        self.documents.lock().unwrap().push_back(CloudDocument {
            id: id.to_string(),
            data: data.to_string(),
            timestamp: None,
            status: "pending".to_string(),
            kind,
        });
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> Vec<String> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }
}

#[async_trait]
impl CloudQueue for MockCloud {
    async fn oldest_pending(&self, skip: &[String]) -> Result<Option<CloudDocument>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| !skip.contains(&d.id))
            .cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.documents.lock().unwrap().retain(|d| d.id != id);
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// ============================================================================
// Router and relay
// ============================================================================

pub struct Harness {
    pub radio: Arc<MockRadio>,
    pub link: LinkHandle,
    pub peers: Arc<MockPeerChannel>,
    pub router: RouterHandle,
}

pub fn router_settings(name: &str) -> RouterSettings {
    RouterSettings {
        display_name: name.to_string(),
        ..RouterSettings::default()
    }
}

/// Router over a mock link (not powered) and mock peers.
pub fn spawn_router(name: &str, cloud: Option<Arc<MockCloud>>) -> Harness {
    let (radio, link) = spawn_link(182);
    let (peer_tx, peer_rx) = peer_channel();
    let peers = Arc::new(MockPeerChannel::new(peer_tx));
    let cloud = cloud.map(|c| c as Arc<dyn CloudQueue>);
    let router = JobRouter::spawn(
        link.clone(),
        Arc::clone(&peers) as Arc<dyn PeerChannel>,
        peer_rx,
        cloud,
        router_settings(name),
    );
    Harness {
        radio,
        link,
        peers,
        router,
    }
}

/// Wait until the router snapshot satisfies `f`.
pub async fn wait_for_router<F>(router: &RouterHandle, f: F)
where
    F: FnMut(&t02relay::router::RouterSnapshot) -> bool,
{
    let mut rx = router.subscribe();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(f))
        .await
        .expect("router condition not reached")
        .expect("router stopped");
}

pub fn relay_for(harness: &Harness) -> Arc<Relay> {
    let config = RelayConfig {
        display_name: "relay".to_string(),
        ..RelayConfig::default()
    };
    Arc::new(Relay::new(
        &config,
        harness.link.clone(),
        harness.router.clone(),
        RecentLogs::new(20),
    ))
}

// ============================================================================
// Images
// ============================================================================

pub fn png(width: u32, height: u32, luma: u8) -> Vec<u8> {
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([luma])));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
