//! # Relay Context
//!
//! [`Relay`] is the one object a process builds to own the printer link,
//! the job router, the recent-log buffer and the last-job preview. The HTTP
//! server and the CLI both go through it.
//!
//! ```text
//!  submit_image / submit_text / submit_bridge_message
//!        │
//!        ▼  spawn_blocking
//!  rasterize or lay out ──► encode (Init, Raster…, Feed) ──► preview
//!        │
//!        ▼
//!  JobRouter::submit ──► peer host  or  local link
//! ```

use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::ir;
use crate::logging::RecentLogs;
use crate::printer::PrinterConfig;
use crate::render::{DitheringAlgorithm, MonochromeBitmap, RasterOptions, Rasterized, rasterize_bytes};
use crate::router::bridge::render_payload;
use crate::router::{BridgeMessage, Delivery, JobKind, PrintJob, RouterHandle, RouterSnapshot};
use crate::text::{FontBook, LayoutMetrics, TextLayout, TextOptions, layout_text_with};
use crate::transport::{LinkHandle, LinkSnapshot};

/// Bitmap of the most recently submitted job.
#[derive(Debug, Clone)]
pub struct Preview {
    pub job: Uuid,
    pub kind: JobKind,
    pub bitmap: MonochromeBitmap,
    pub rotated: bool,
    pub created_at: DateTime<Local>,
}

/// Outcome of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReceipt {
    pub id: Uuid,
    pub kind: JobKind,
    #[serde(flatten)]
    pub delivery: Delivery,
    pub width: usize,
    pub height: usize,
    pub rotated: bool,
}

/// Everything the status surface shows.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub printer: &'static str,
    /// Printer link is ready for writes
    pub printer_connected: bool,
    /// At least one peer session is open
    pub peer_connected: bool,
    pub link: LinkSnapshot,
    pub router: RouterSnapshot,
    pub logs: Vec<String>,
}

pub struct Relay {
    printer: PrinterConfig,
    raster: RasterOptions,
    metrics: LayoutMetrics,
    fonts: FontBook,
    link: LinkHandle,
    router: RouterHandle,
    logs: RecentLogs,
    preview: Mutex<Option<Preview>>,
}

impl Relay {
    pub fn new(config: &RelayConfig, link: LinkHandle, router: RouterHandle, logs: RecentLogs) -> Self {
        let fonts = match &config.font_dir {
            Some(dir) => FontBook::from_dir(dir),
            None => FontBook::builtin(),
        };
        Self {
            printer: config.printer,
            raster: config.raster,
            metrics: config.metrics.clone(),
            fonts,
            link,
            router,
            logs,
            preview: Mutex::new(None),
        }
    }

    pub fn printer(&self) -> &PrinterConfig {
        &self.printer
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Raster options for an image job; missing values use the configured defaults.
    pub fn raster_options(&self, algorithm: Option<&str>, threshold: Option<u8>) -> RasterOptions {
        RasterOptions {
            algorithm: algorithm
                .map(DitheringAlgorithm::from_name)
                .unwrap_or(self.raster.algorithm),
            threshold: threshold.unwrap_or(self.raster.threshold),
            ..self.raster
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    pub async fn render_image(&self, bytes: Vec<u8>, options: RasterOptions) -> Result<Rasterized> {
        let printer = self.printer;
        blocking(move || rasterize_bytes(&bytes, &options, &printer)).await
    }

    pub async fn render_text(&self, options: TextOptions) -> Result<TextLayout> {
        let printer = self.printer;
        let fonts = self.fonts.clone();
        let metrics = self.metrics.clone();
        blocking(move || layout_text_with(&options, &fonts, &printer, &metrics)).await
    }

    pub async fn render_bridge(&self, message: BridgeMessage) -> Result<Rasterized> {
        let printer = self.printer;
        let options = self.raster;
        blocking(move || render_payload(&message.base64, message.kind, &options, &printer)).await
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub async fn submit_image(
        &self,
        bytes: Vec<u8>,
        algorithm: Option<&str>,
        threshold: Option<u8>,
    ) -> Result<JobReceipt> {
        let options = self.raster_options(algorithm, threshold);
        let raster = self.render_image(bytes, options).await?;
        self.submit_bitmap(JobKind::Image, raster.bitmap, raster.rotated).await
    }

    pub async fn submit_text(&self, options: TextOptions) -> Result<JobReceipt> {
        let layout = self.render_text(options).await?;
        self.submit_bitmap(JobKind::Text, layout.bitmap, false).await
    }

    pub async fn submit_bridge_message(&self, message: BridgeMessage) -> Result<JobReceipt> {
        let kind = message.kind.job_kind();
        let raster = self.render_bridge(message).await?;
        self.submit_bitmap(kind, raster.bitmap, raster.rotated).await
    }

    async fn submit_bitmap(
        &self,
        kind: JobKind,
        bitmap: MonochromeBitmap,
        rotated: bool,
    ) -> Result<JobReceipt> {
        let program = ir::encode(&bitmap, None, &self.printer)?;
        let job = PrintJob::from_program(kind, &program);
        let (id, width, height) = (job.id, bitmap.width(), bitmap.height());
        self.store_preview(Preview {
            job: id,
            kind,
            bitmap,
            rotated,
            created_at: job.created_at,
        });

        match self.router.submit(job).await {
            Ok(delivery) => {
                info!(job = %id, delivery = ?delivery, "Job delivered");
                Ok(JobReceipt {
                    id,
                    kind,
                    delivery,
                    width,
                    height,
                    rotated,
                })
            }
            Err(e) => {
                warn!(job = %id, error = %e, "Job not delivered");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Control and status
    // ========================================================================

    pub fn request_rescan(&self) {
        info!("Rescan requested");
        self.link.rescan();
    }

    /// Rename this relay and return the name now in effect. A blank name
    /// leaves the current one in place.
    pub fn set_display_name(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            debug!("Blank display name ignored");
            return self.router.snapshot().display_name;
        }
        self.router.set_display_name(name);
        name.to_string()
    }

    pub fn status(&self) -> RelayStatus {
        let link = self.link.snapshot();
        let router = self.router.snapshot();
        RelayStatus {
            printer: self.printer.name,
            printer_connected: link.is_ready(),
            peer_connected: !router.connected.is_empty(),
            link,
            router,
            logs: self.logs.lines(),
        }
    }

    pub fn last_preview(&self) -> Option<Preview> {
        self.preview
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_preview(&self, preview: Preview) {
        *self.preview.lock().unwrap_or_else(|e| e.into_inner()) = Some(preview);
    }
}

/// Run CPU-bound work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RelayError::Transport(format!("render task failed: {}", e)))?
}
