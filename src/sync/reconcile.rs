use crate::scene::{DeltaPatch, WorkingCopy};

/// Outcome of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: usize,
    /// Patches for ids the working copy does not hold. Expected whenever
    /// patches race the snapshot, so they are counted and skipped.
    pub unknown: usize,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: ReconcileReport) {
        self.applied += other.applied;
        self.unknown += other.unknown;
    }
}

/// Merges a batch into the working copy, in array order.
///
/// Only the fields present in each patch are written; later patches for the
/// same id win. Items are never created or removed here.
pub fn apply(working: &mut WorkingCopy, batch: &[DeltaPatch]) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for patch in batch {
        match working.get_mut(&patch.id) {
            Some(item) => {
                patch.merge_into(item);
                report.applied += 1;
            }
            None => {
                log::trace!("Skipping patch for unknown item id {:?}", patch.id);
                report.unknown += 1;
            }
        }
    }
    report
}
