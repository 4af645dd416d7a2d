//! # Link Manager
//!
//! Owns the [`LinkMachine`] and the radio. Two tokio tasks:
//!
//! ```text
//!  radio ──events──► link task ──actions──► radio
//!                       │
//!                       └─ watch<LinkSnapshot> ──► write worker ──chunks──► radio
//!                                              └─► router, status
//! ```
//!
//! The link task is the only place the state machine is mutated. Everything
//! else reads the published [`LinkSnapshot`]. Writes go through one worker
//! so two jobs never interleave bytes on the wire. `Radio::connect` runs on
//! its own task, so a connect that never returns cannot hold up the connect
//! timer or any later event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chunker::{Chunker, DEFAULT_PACING};
use super::link::{LinkAction, LinkEvent, LinkMachine, LinkSnapshot, LinkState, LinkTimings};
use super::radio::{DeviceId, LinkEventReceiver, LinkEventSender, Radio};
use crate::error::{RelayError, Result};

/// Timing policy for the link and its write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub timings: LinkTimings,
    /// Pause after each written chunk
    pub pacing: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            timings: LinkTimings::default(),
            pacing: DEFAULT_PACING,
        }
    }
}

struct WriteJob {
    frames: Vec<Vec<u8>>,
    reply: oneshot::Sender<Result<()>>,
}

/// Spawns the link tasks.
pub struct LinkManager;

impl LinkManager {
    /// Start the link and write tasks on the current runtime.
    ///
    /// `events` must be the channel the radio was built with.
    pub fn spawn<R: Radio>(
        radio: Arc<R>,
        events: (LinkEventSender, LinkEventReceiver),
        settings: LinkSettings,
    ) -> LinkHandle {
        let (events_tx, events_rx) = events;
        let (snapshot_tx, snapshot_rx) = watch::channel(LinkSnapshot::default());
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();

        let driver = LinkDriver {
            radio: Arc::clone(&radio),
            machine: LinkMachine::new(settings.timings),
            events: events_tx.clone(),
            snapshot: snapshot_tx,
            connect_timer: None,
            connect_task: None,
            rescan_timer: None,
        };
        tokio::spawn(driver.run(events_rx));
        tokio::spawn(write_worker(
            radio,
            snapshot_rx.clone(),
            writes_rx,
            settings.pacing,
        ));

        LinkHandle {
            events: events_tx,
            snapshot: snapshot_rx,
            writes: writes_tx,
        }
    }
}

/// Cloneable handle to a running link.
#[derive(Clone)]
pub struct LinkHandle {
    events: LinkEventSender,
    snapshot: watch::Receiver<LinkSnapshot>,
    writes: mpsc::UnboundedSender<WriteJob>,
}

impl LinkHandle {
    pub fn state(&self) -> LinkState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.borrow().is_ready()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.snapshot.clone()
    }

    /// Ask for a fresh scan. Ignored while connecting or ready.
    pub fn rescan(&self) {
        let _ = self.events.send(LinkEvent::RescanRequested);
    }

    /// Write a job's frames to the printer.
    ///
    /// Fails with [`RelayError::NotConnected`] right away unless the link is
    /// `Ready`. Otherwise the job joins the write queue and the call resolves
    /// once every chunk has been written, or on the first failed chunk.
    pub async fn write(&self, frames: Vec<Vec<u8>>) -> Result<()> {
        if !self.is_ready() {
            return Err(RelayError::NotConnected);
        }
        let (reply, done) = oneshot::channel();
        self.writes
            .send(WriteJob { frames, reply })
            .map_err(|_| RelayError::Transport("write queue closed".to_string()))?;
        done.await
            .map_err(|_| RelayError::Transport("write worker stopped".to_string()))?
    }
}

// ============================================================================
// Link task
// ============================================================================

struct LinkDriver<R: Radio> {
    radio: Arc<R>,
    machine: LinkMachine,
    events: LinkEventSender,
    snapshot: watch::Sender<LinkSnapshot>,
    connect_timer: Option<JoinHandle<()>>,
    /// In-flight `Radio::connect`; the link task never waits on it
    connect_task: Option<(DeviceId, JoinHandle<()>)>,
    rescan_timer: Option<JoinHandle<()>>,
}

impl<R: Radio> LinkDriver<R> {
    async fn run(mut self, mut events: LinkEventReceiver) {
        info!("Link manager started");
        while let Some(event) = events.recv().await {
            let before = self.machine.state();
            if let LinkEvent::ConnectTimedOut { attempt } = &event {
                if before == LinkState::Connecting && *attempt == self.machine.attempt() {
                    warn!(attempt, error = %RelayError::LinkTimeout, "Connect attempt abandoned");
                }
            }
            debug!(?event, state = %before, "Link event");

            let actions = self.machine.handle(event);
            let after = self.machine.state();
            if before != after {
                match self.machine.snapshot().device {
                    Some(device) => info!(from = %before, to = %after, device = %device.label(), "Link state"),
                    None => info!(from = %before, to = %after, "Link state"),
                }
            }
            self.snapshot.send_replace(self.machine.snapshot());

            for action in actions {
                self.execute(action).await;
            }
        }
        info!("Link event channel closed, link manager stopping");
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    fn timer(&self, after: Duration, event: LinkEvent) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(event);
        })
    }

    async fn execute(&mut self, action: LinkAction) {
        debug!(?action, "Link action");
        match action {
            LinkAction::StartScan => match self.radio.connected_peripherals().await {
                Ok(found) if !found.is_empty() => {
                    let peripheral = found[0].clone();
                    info!(device = %peripheral.label(), "Printer already connected by the system");
                    self.emit(LinkEvent::SystemConnected(peripheral));
                }
                Ok(_) => {
                    if let Err(e) = self.radio.start_scan().await {
                        warn!(error = %e, "Failed to start scan");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to list connected peripherals");
                    if let Err(e) = self.radio.start_scan().await {
                        warn!(error = %e, "Failed to start scan");
                    }
                }
            },
            LinkAction::StopScan => {
                if let Err(e) = self.radio.stop_scan().await {
                    warn!(error = %e, "Failed to stop scan");
                }
            }
            LinkAction::Connect(peripheral) => {
                info!(device = %peripheral.label(), "Connecting");
                let radio = Arc::clone(&self.radio);
                let events = self.events.clone();
                let device = peripheral.id.clone();
                let task = tokio::spawn(async move {
                    if let Err(e) = radio.connect(&peripheral).await {
                        let _ = events.send(LinkEvent::ConnectFailed {
                            device: peripheral.id,
                            reason: e.to_string(),
                        });
                    }
                });
                if let Some((_, old)) = self.connect_task.replace((device, task)) {
                    old.abort();
                }
            }
            LinkAction::CancelConnect(device) => {
                if self.connect_task.as_ref().is_some_and(|(d, _)| d == &device) {
                    if let Some((_, task)) = self.connect_task.take() {
                        task.abort();
                    }
                }
                if let Err(e) = self.radio.cancel_connect(&device).await {
                    warn!(device = %device, error = %e, "Failed to cancel connection");
                }
            }
            LinkAction::StartConnectTimer { attempt, after } => {
                if let Some(old) = self.connect_timer.take() {
                    old.abort();
                }
                self.connect_timer = Some(self.timer(after, LinkEvent::ConnectTimedOut { attempt }));
            }
            LinkAction::CancelConnectTimer => {
                if let Some(timer) = self.connect_timer.take() {
                    timer.abort();
                }
            }
            LinkAction::DiscoverCharacteristic(device) => {
                if let Err(e) = self.radio.discover_write_characteristic(&device).await {
                    self.emit(LinkEvent::DiscoveryFailed {
                        device,
                        reason: e.to_string(),
                    });
                }
            }
            LinkAction::ScheduleRescan { attempt, after } => {
                if let Some(old) = self.rescan_timer.take() {
                    old.abort();
                }
                if after.is_zero() {
                    self.emit(LinkEvent::RetryElapsed { attempt });
                } else {
                    self.rescan_timer = Some(self.timer(after, LinkEvent::RetryElapsed { attempt }));
                }
            }
        }
    }
}

// ============================================================================
// Write worker
// ============================================================================

async fn write_worker<R: Radio>(
    radio: Arc<R>,
    snapshot: watch::Receiver<LinkSnapshot>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    pacing: Duration,
) {
    while let Some(job) = jobs.recv().await {
        let result = write_frames(radio.as_ref(), &snapshot, &job.frames, pacing).await;
        match &result {
            Ok(()) => info!(frames = job.frames.len(), "Job written"),
            Err(e) => warn!(error = %e, "Job failed"),
        }
        let _ = job.reply.send(result);
    }
}

async fn write_frames<R: Radio>(
    radio: &R,
    snapshot: &watch::Receiver<LinkSnapshot>,
    frames: &[Vec<u8>],
    pacing: Duration,
) -> Result<()> {
    let characteristic = {
        let snap = snapshot.borrow();
        match (&snap.state, &snap.characteristic) {
            (LinkState::Ready, Some(c)) => c.clone(),
            _ => return Err(RelayError::NotConnected),
        }
    };

    let total: usize = frames.iter().map(Vec::len).sum();
    debug!(
        bytes = total,
        write_size = characteristic.max_write_size,
        "Writing job"
    );

    for frame in frames {
        let chunker = Chunker::new(frame, characteristic.max_write_size, pacing)?;
        for chunk in &chunker {
            if !snapshot.borrow().is_ready() {
                return Err(RelayError::Transport("link lost during write".to_string()));
            }
            radio
                .write(&characteristic, chunk)
                .await
                .map_err(|e| match e {
                    RelayError::Transport(_) => e,
                    other => RelayError::Transport(other.to_string()),
                })?;
            tokio::time::sleep(chunker.pacing()).await;
        }
    }
    Ok(())
}
