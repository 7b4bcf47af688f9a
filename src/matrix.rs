//! All-pairs probe matrix
//!
//! An owned two-level map `source -> target -> ProbeCell` that remembers
//! insertion order on both levels. Reading a missing pair returns `None`
//! and never creates an entry; the matrix is assembled once (through
//! [`FromIterator`]) and only read afterwards.

use crate::machine::MachineId;
use crate::sample::ProbeCell;
use indexmap::{IndexMap, IndexSet};

/// Latency matrix for one run (current) or one baseline file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeMatrix {
    rows: IndexMap<MachineId, IndexMap<MachineId, ProbeCell>>,
}

impl ProbeMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cell. A replaced cell keeps its original position.
    fn insert(&mut self, source: MachineId, target: MachineId, cell: ProbeCell) {
        self.rows.entry(source).or_default().insert(target, cell);
    }

    /// Cell for a pair, if present
    pub fn get(&self, source: &MachineId, target: &MachineId) -> Option<&ProbeCell> {
        self.rows.get(source)?.get(target)
    }

    /// Every pair in source-major, target-minor insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&MachineId, &MachineId, &ProbeCell)> {
        self.rows
            .iter()
            .flat_map(|(source, row)| row.iter().map(move |(target, cell)| (source, target, cell)))
    }

    /// Row sources in insertion order
    pub fn sources(&self) -> impl Iterator<Item = &MachineId> {
        self.rows.keys()
    }

    /// Distinct targets across all rows, in first-seen order
    pub fn targets(&self) -> Vec<&MachineId> {
        self.rows
            .values()
            .flat_map(IndexMap::keys)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of (source, target) pairs
    pub fn len(&self) -> usize {
        self.rows.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(MachineId, MachineId, ProbeCell)> for ProbeMatrix {
    fn from_iter<I: IntoIterator<Item = (MachineId, MachineId, ProbeCell)>>(iter: I) -> Self {
        let mut matrix = ProbeMatrix::new();
        for (source, target, cell) in iter {
            matrix.insert(source, target, cell);
        }
        matrix
    }
}
