//! # Job Router
//!
//! Decides where a job executes and keeps the peer session in step with the
//! printer link.
//!
//! ## Roles
//!
//! The device whose printer link is `Ready` is the **host**; every other
//! device is a **client**. Each role change restarts advertising and
//! browsing under the new role. Clients invite hosts they find; hosts wait.
//!
//! ```text
//!  client                          host                        printer
//!    │ submit                        │                             │
//!    │─ wait ≤ peer_wait for session │                             │
//!    │══ frame list ════════════════►│ buffer (latest wins)        │
//!    │                               │── link ready? ── chunks ────►│
//! ```
//!
//! A client with no session after `peer_wait` falls back to its own link,
//! which fails with `NotConnected` when there is none.
//!
//! ## Inbound jobs
//!
//! At most one inbound job is buffered. A newer one replaces it. The
//! buffered job is written once the link is `Ready`.
//!
//! ## Cloud relay
//!
//! While host, a poll task processes the oldest pending cloud document,
//! one at a time, and deletes it only after the write completed.

pub mod bridge;
pub mod cloud;
pub mod job;
pub mod lan;
pub mod peer;
pub mod role;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::printer::PrinterConfig;
use crate::transport::{LinkHandle, LinkSnapshot, LinkState};

pub use bridge::BridgeMessage;
pub use cloud::{CloudDocument, CloudQueue, FirestoreConfig, FirestoreQueue};
pub use job::{Delivery, JobKind, PrintJob, RenderKind};
pub use lan::LanPeerChannel;
pub use peer::{PeerChannel, PeerEvent, PeerEventReceiver, PeerEventSender, PeerId, PeerState, peer_channel};
pub use role::Role;

/// Router timing and identity.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub display_name: String,
    /// How long a client waits for a host session before printing locally
    pub peer_wait: Duration,
    pub cloud_poll: Duration,
    pub printer: PrinterConfig,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            display_name: "t02relay".to_string(),
            peer_wait: Duration::from_secs(3),
            cloud_poll: Duration::from_secs(2),
            printer: PrinterConfig::T02,
        }
    }
}

/// Read-only router state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterSnapshot {
    pub role: Role,
    pub display_name: String,
    /// Relays seen on the network, with their advertised role
    pub peers: BTreeMap<String, Role>,
    pub connected: Vec<String>,
    /// Session status line
    pub status: String,
    pub inbound_pending: bool,
    pub draining: bool,
    pub cloud_status: String,
    /// Cloud document currently held
    pub cloud_job: Option<String>,
}

enum RouterMessage {
    SetDisplayName(String),
    Status(String),
    DrainDone { peer: PeerId, result: Result<()> },
    Cloud { job: Option<String>, status: String },
}

/// Spawns the router task.
pub struct JobRouter;

impl JobRouter {
    pub fn spawn(
        link: LinkHandle,
        peers: Arc<dyn PeerChannel>,
        peer_events: PeerEventReceiver,
        cloud: Option<Arc<dyn CloudQueue>>,
        settings: RouterSettings,
    ) -> RouterHandle {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let role = Role::for_link(link.state());
        let (snapshot_tx, snapshot_rx) = watch::channel(RouterSnapshot {
            role,
            display_name: settings.display_name.clone(),
            status: role.waiting_message().to_string(),
            ..RouterSnapshot::default()
        });

        let router = Router {
            link: link.clone(),
            peers: Arc::clone(&peers),
            cloud,
            role,
            display_name: settings.display_name.clone(),
            found: BTreeMap::new(),
            connected: BTreeSet::new(),
            connecting: BTreeSet::new(),
            status: String::new(),
            inbound: None,
            draining: false,
            cloud_task: None,
            cloud_job: None,
            cloud_status: "Idle".to_string(),
            snapshot: snapshot_tx,
            messages: messages_tx.clone(),
            settings: settings.clone(),
        };
        tokio::spawn(router.run(peer_events, messages_rx, link.subscribe()));

        RouterHandle {
            messages: messages_tx,
            snapshot: snapshot_rx,
            link,
            peers,
            peer_wait: settings.peer_wait,
        }
    }
}

/// Cloneable handle to the running router.
#[derive(Clone)]
pub struct RouterHandle {
    messages: mpsc::UnboundedSender<RouterMessage>,
    snapshot: watch::Receiver<RouterSnapshot>,
    link: LinkHandle,
    peers: Arc<dyn PeerChannel>,
    peer_wait: Duration,
}

impl RouterHandle {
    pub fn snapshot(&self) -> RouterSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn role(&self) -> Role {
        self.snapshot.borrow().role
    }

    pub fn subscribe(&self) -> watch::Receiver<RouterSnapshot> {
        self.snapshot.clone()
    }

    /// Rename this relay. Blank or unchanged names are ignored.
    pub fn set_display_name(&self, name: &str) {
        let _ = self
            .messages
            .send(RouterMessage::SetDisplayName(name.trim().to_string()));
    }

    fn set_status(&self, status: impl Into<String>) {
        let _ = self.messages.send(RouterMessage::Status(status.into()));
    }

    /// Deliver a job: forwarded to a host when this device is a client with
    /// a session, written to the local link otherwise.
    pub async fn submit(&self, job: PrintJob) -> Result<Delivery> {
        info!(job = %job.id, kind = ?job.kind, bytes = job.byte_len(), "Submitting job");

        if self.role() == Role::Client {
            let target = {
                let mut rx = self.snapshot.clone();
                let session = rx.wait_for(|s| s.role == Role::Host || !s.connected.is_empty());
                match tokio::time::timeout(self.peer_wait, session).await {
                    Ok(Ok(snap)) if snap.role == Role::Client => Some(snap.connected.clone()),
                    _ => None,
                }
            };

            match target {
                Some(peers) => return self.forward(&job, peers).await,
                None if self.role() == Role::Client => {
                    debug!(job = %job.id, "No host session, printing locally");
                    self.set_status("No peers connected");
                }
                None => {}
            }
        }

        self.link.write(job.frames).await?;
        Ok(Delivery::Printed)
    }

    async fn forward(&self, job: &PrintJob, peers: Vec<String>) -> Result<Delivery> {
        let ids: Vec<PeerId> = peers.iter().cloned().map(PeerId).collect();
        let payload = peer::encode_job(&job.frames)?;
        match self.peers.send(&ids, &payload).await {
            Ok(()) => {
                info!(job = %job.id, peers = %peers.join(", "), "Job forwarded");
                self.set_status("Job sent");
                Ok(Delivery::Forwarded {
                    peer: peers.join(", "),
                })
            }
            Err(e) => {
                warn!(job = %job.id, error = %e, "Forwarding failed");
                self.set_status(format!("Send failed: {}", e));
                Err(match e {
                    RelayError::PeerSend(_) => e,
                    other => RelayError::PeerSend(other.to_string()),
                })
            }
        }
    }
}

// ============================================================================
// Router task
// ============================================================================

struct Router {
    link: LinkHandle,
    peers: Arc<dyn PeerChannel>,
    cloud: Option<Arc<dyn CloudQueue>>,
    settings: RouterSettings,
    role: Role,
    display_name: String,
    found: BTreeMap<PeerId, Role>,
    connected: BTreeSet<PeerId>,
    connecting: BTreeSet<PeerId>,
    status: String,
    inbound: Option<(PeerId, Vec<Vec<u8>>)>,
    draining: bool,
    cloud_task: Option<JoinHandle<()>>,
    cloud_job: Option<String>,
    cloud_status: String,
    snapshot: watch::Sender<RouterSnapshot>,
    messages: mpsc::UnboundedSender<RouterMessage>,
}

impl Router {
    async fn run(
        mut self,
        mut peer_events: PeerEventReceiver,
        mut messages: mpsc::UnboundedReceiver<RouterMessage>,
        mut link: watch::Receiver<LinkSnapshot>,
    ) {
        info!(role = %self.role, name = %self.display_name, "Job router started");
        self.restart_services().await;
        self.update_cloud();
        self.publish();

        loop {
            tokio::select! {
                changed = link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = link.borrow_and_update().state;
                    self.on_link(state).await;
                }
                Some(event) = peer_events.recv() => self.on_peer(event).await,
                Some(message) = messages.recv() => self.on_message(message).await,
                else => break,
            }
            self.publish();
        }
        if let Some(task) = self.cloud_task.take() {
            task.abort();
        }
        info!("Job router stopped");
    }

    fn publish(&self) {
        self.snapshot.send_replace(RouterSnapshot {
            role: self.role,
            display_name: self.display_name.clone(),
            peers: self
                .found
                .iter()
                .map(|(peer, role)| (peer.0.clone(), *role))
                .collect(),
            connected: self.connected.iter().map(|p| p.0.clone()).collect(),
            status: self.status.clone(),
            inbound_pending: self.inbound.is_some(),
            draining: self.draining,
            cloud_status: self.cloud_status.clone(),
            cloud_job: self.cloud_job.clone(),
        });
    }

    async fn restart_services(&mut self) {
        self.found.clear();
        self.connected.clear();
        self.connecting.clear();
        self.status = self.role.waiting_message().to_string();
        if let Err(e) = self.peers.start(self.role, &self.display_name).await {
            warn!(error = %e, "Peer services failed to start");
            self.status = "Advertise failed".to_string();
        }
    }

    async fn on_link(&mut self, state: LinkState) {
        let role = Role::for_link(state);
        if role != self.role {
            info!(from = %self.role, to = %role, "Role changed");
            self.role = role;
            self.restart_services().await;
            self.update_cloud();
        }
        if state == LinkState::Ready {
            self.try_drain();
        }
    }

    async fn on_peer(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Found { peer, role } => {
                self.found.insert(peer.clone(), role);
                let wanted = self.role == Role::Client && role == Role::Host;
                if wanted && !self.connected.contains(&peer) && !self.connecting.contains(&peer) {
                    info!(peer = %peer, "Inviting host");
                    self.connecting.insert(peer.clone());
                    if let Err(e) = self.peers.invite(&peer).await {
                        warn!(peer = %peer, error = %e, "Invite failed");
                        self.connecting.remove(&peer);
                    }
                }
            }
            PeerEvent::Lost { peer } => {
                self.found.remove(&peer);
            }
            PeerEvent::StateChanged { peer, state } => {
                match state {
                    PeerState::Connected => {
                        self.connecting.remove(&peer);
                        if let Some(role) = self.found.get(&peer).filter(|r| !self.role.pairs_with(**r)) {
                            warn!(peer = %peer, role = %role, "Ignoring session with a relay of the same role");
                            return;
                        }
                        self.connected.insert(peer.clone());
                        self.status = format!("Connected: {}", peer);
                    }
                    PeerState::Connecting => {
                        self.connecting.insert(peer);
                        self.status = "Connecting…".to_string();
                    }
                    PeerState::NotConnected => {
                        self.connecting.remove(&peer);
                        self.connected.remove(&peer);
                        self.status = match self.connected.iter().next() {
                            Some(other) => format!("Connected: {}", other),
                            None => self.role.waiting_message().to_string(),
                        };
                    }
                }
            }
            PeerEvent::Received { peer, payload } => match peer::decode_job(&payload) {
                Ok(frames) => {
                    info!(peer = %peer, frames = frames.len(), "Job received from peer");
                    if let Some((previous, _)) = self.inbound.replace((peer, frames)) {
                        info!(from = %previous, "Replaced unconsumed inbound job");
                    }
                    self.try_drain();
                }
                Err(e) => warn!(peer = %peer, error = %e, "Discarding undecodable peer job"),
            },
            PeerEvent::AdvertiseFailed(reason) => {
                warn!(reason = %reason, "Advertising failed");
                self.status = "Advertise failed".to_string();
            }
            PeerEvent::BrowseFailed(reason) => {
                warn!(reason = %reason, "Browsing failed");
                self.status = "Browse failed".to_string();
            }
        }
    }

    async fn on_message(&mut self, message: RouterMessage) {
        match message {
            RouterMessage::SetDisplayName(name) => {
                if name.is_empty() || name == self.display_name {
                    debug!(name = %name, "Display name unchanged");
                    return;
                }
                info!(name = %name, "Display name changed");
                self.display_name = name;
                self.restart_services().await;
            }
            RouterMessage::Status(status) => self.status = status,
            RouterMessage::DrainDone { peer, result } => {
                self.draining = false;
                match result {
                    Ok(()) => info!(peer = %peer, "Printed job from peer"),
                    Err(e) => warn!(peer = %peer, error = %e, "Inbound job failed"),
                }
                self.try_drain();
            }
            RouterMessage::Cloud { job, status } => {
                self.cloud_job = job;
                self.cloud_status = status;
            }
        }
    }

    /// Write the buffered inbound job if the link allows it.
    fn try_drain(&mut self) {
        if self.draining || !self.link.is_ready() {
            return;
        }
        let Some((peer, frames)) = self.inbound.take() else {
            return;
        };
        self.draining = true;
        let link = self.link.clone();
        let messages = self.messages.clone();
        tokio::spawn(async move {
            let result = link.write(frames).await;
            let _ = messages.send(RouterMessage::DrainDone { peer, result });
        });
    }

    fn update_cloud(&mut self) {
        match (self.role, &self.cloud) {
            (Role::Host, Some(cloud)) => {
                if self.cloud_task.is_none() {
                    info!("Listening for cloud jobs");
                    self.cloud_status = "Listening for jobs...".to_string();
                    self.cloud_task = Some(tokio::spawn(cloud_loop(
                        Arc::clone(cloud),
                        self.link.clone(),
                        self.settings.printer,
                        self.settings.cloud_poll,
                        self.messages.clone(),
                    )));
                }
            }
            _ => {
                if let Some(task) = self.cloud_task.take() {
                    info!("Stopped listening for cloud jobs");
                    task.abort();
                    self.cloud_job = None;
                    self.cloud_status = "Idle".to_string();
                }
            }
        }
    }
}

async fn cloud_loop(
    cloud: Arc<dyn CloudQueue>,
    link: LinkHandle,
    printer: PrinterConfig,
    interval: Duration,
    messages: mpsc::UnboundedSender<RouterMessage>,
) {
    let report = |job: Option<String>, status: &str| {
        let _ = messages.send(RouterMessage::Cloud {
            job,
            status: status.to_string(),
        });
    };
    let mut skip: Vec<String> = Vec::new();

    loop {
        match cloud.oldest_pending(&skip).await {
            Ok(Some(doc)) => {
                report(Some(doc.id.clone()), "New Job Received!");
                let converting = doc.clone();
                let frames = tokio::task::spawn_blocking(move || converting.to_frames(&printer))
                    .await
                    .map_err(|e| RelayError::Transport(e.to_string()))
                    .and_then(|r| r);

                match frames {
                    Err(e) => {
                        warn!(id = %doc.id, error = %e, "Received invalid job data");
                        skip.push(doc.id.clone());
                        report(None, "Received invalid job data");
                    }
                    Ok(frames) => match link.write(frames).await {
                        Ok(()) => match cloud.delete(&doc.id).await {
                            Ok(()) => {
                                info!(id = %doc.id, "Cloud job completed & deleted");
                                report(None, "Job completed & deleted");
                            }
                            Err(e) => {
                                warn!(id = %doc.id, error = %e, "Cloud job printed but not deleted");
                                skip.push(doc.id.clone());
                                report(None, "Job printed, delete failed");
                            }
                        },
                        Err(e) => {
                            warn!(id = %doc.id, error = %e, "Cloud job not printed");
                            report(None, &format!("Error: {}", e));
                        }
                    },
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, "Cloud queue poll failed");
                report(None, &format!("Error: {}", e));
            }
        }
        tokio::time::sleep(interval).await;
    }
}
