//! Print jobs as they travel through the router.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ir::Program;

/// What produced the job's bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Text,
}

/// Payload tag used by the bridge and the cloud relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    #[default]
    ImageRender,
    /// Already portrait; never auto-rotated
    TextRender,
}

impl RenderKind {
    pub fn auto_rotate(&self) -> bool {
        matches!(self, Self::ImageRender)
    }

    pub fn job_kind(&self) -> JobKind {
        match self {
            Self::ImageRender => JobKind::Image,
            Self::TextRender => JobKind::Text,
        }
    }
}

/// An encoded job: the frame list written to the printer or forwarded to a
/// peer, in order (Init, Raster slices, Feed).
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub created_at: DateTime<Local>,
    pub frames: Vec<Vec<u8>>,
}

impl PrintJob {
    pub fn new(kind: JobKind, frames: Vec<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            created_at: Local::now(),
            frames,
        }
    }

    pub fn from_program(kind: JobKind, program: &Program) -> Self {
        Self::new(kind, program.to_frames())
    }

    /// Total bytes across all frames.
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

/// How a submitted job was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "lowercase")]
pub enum Delivery {
    /// Written to the local printer link
    Printed,
    /// Sent to a connected host
    Forwarded { peer: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_kind_names() {
        let kind: RenderKind = serde_json::from_str("\"text_render\"").unwrap();
        assert_eq!(kind, RenderKind::TextRender);
        assert!(!kind.auto_rotate());
        assert_eq!(
            serde_json::to_string(&RenderKind::ImageRender).unwrap(),
            "\"image_render\""
        );
    }

    #[test]
    fn test_job_byte_len() {
        let job = PrintJob::new(JobKind::Image, vec![vec![0x1B, 0x40], vec![0x1B, 0x64, 1]]);
        assert_eq!(job.byte_len(), 5);
    }

    #[test]
    fn test_delivery_json() {
        let json = serde_json::to_value(Delivery::Forwarded {
            peer: "kitchen".to_string(),
        })
        .unwrap();
        assert_eq!(json["delivery"], "forwarded");
        assert_eq!(json["peer"], "kitchen");
    }
}
