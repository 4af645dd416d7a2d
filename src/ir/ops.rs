//! # IR Operations
//!
//! The three printer operations a T02 job is made of.

/// A single printer operation.
///
/// A job is always `Init`, one or more `Raster` slices in row order, then
/// exactly one `Feed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Initialize printer (ESC @). Resets to default state.
    Init,

    /// Raster bit image (GS v 0). `data.len() == width_bytes * height`.
    Raster {
        width_bytes: u16,
        height: u16,
        data: Vec<u8>,
    },

    /// Print and feed `lines` lines (ESC d n).
    Feed { lines: u8 },
}

impl Op {
    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Op::Init => 2,
            Op::Raster { data, .. } => 8 + data.len(),
            Op::Feed { .. } => 3,
        }
    }
}

/// An ordered printer program for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub ops: Vec<Op>,
}

impl Program {
    /// Create an empty program.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Create a program with an initial Init op.
    pub fn with_init() -> Self {
        Self {
            ops: vec![Op::Init],
        }
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = Op>) {
        self.ops.extend(ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }

    /// Number of raster slices.
    pub fn raster_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Raster { .. }))
            .count()
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.ops.iter().map(Op::encoded_len).sum()
    }
}

impl FromIterator<Op> for Program {
    fn from_iter<T: IntoIterator<Item = Op>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Program {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
