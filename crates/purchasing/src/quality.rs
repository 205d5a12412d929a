//! Quality disposition of received goods (accepted / rejected / damaged).

use serde::{Deserialize, Serialize};

use supplyerp_core::ValueObject;

use crate::error::{ReceivingError, ensure_non_negative};
use crate::ledger::EPSILON;

/// Inspection outcome of one receipt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    /// Not inspected yet (or nothing received).
    #[default]
    Pending,
    Approved,
    Partial,
    Rejected,
}

impl QualityStatus {
    /// Status implied by the quantities alone.
    ///
    /// Rejection wins over approval when both would hold (nothing accepted,
    /// everything rejected or damaged).
    pub fn derive(received: f64, split: &QualitySplit) -> Self {
        if received <= EPSILON {
            QualityStatus::Pending
        } else if split.rejected + split.damaged >= received - EPSILON {
            QualityStatus::Rejected
        } else if (split.accepted - received).abs() <= EPSILON {
            QualityStatus::Approved
        } else {
            QualityStatus::Partial
        }
    }
}

/// Classification of a received quantity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualitySplit {
    pub accepted: f64,
    pub rejected: f64,
    pub damaged: f64,
    pub status: QualityStatus,
}

impl ValueObject for QualitySplit {}

/// A change requested by an inspector. `None` means "not touched".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityChange {
    pub accepted: Option<f64>,
    pub rejected: Option<f64>,
    pub damaged: Option<f64>,
    pub status: Option<QualityStatus>,
}

impl QualityChange {
    pub fn with_accepted(mut self, accepted: f64) -> Self {
        self.accepted = Some(accepted);
        self
    }

    pub fn with_rejected(mut self, rejected: f64) -> Self {
        self.rejected = Some(rejected);
        self
    }

    pub fn with_damaged(mut self, damaged: f64) -> Self {
        self.damaged = Some(damaged);
        self
    }

    pub fn with_status(mut self, status: QualityStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn touches_quantities(&self) -> bool {
        self.accepted.is_some() || self.rejected.is_some() || self.damaged.is_some()
    }
}

impl QualitySplit {
    pub fn total(&self) -> f64 {
        self.accepted + self.rejected + self.damaged
    }

    /// Apply `change` on top of this split for a line that received `received`.
    ///
    /// When rejected or damaged move and accepted is not given in the same
    /// change, accepted becomes whatever is left. An explicit status survives
    /// unless quantities changed in the same call and disagree with it.
    pub fn reconcile(
        &self,
        line_no: u32,
        received: f64,
        change: &QualityChange,
    ) -> Result<QualitySplit, ReceivingError> {
        ensure_non_negative(line_no, "received_quantity", received)?;
        for (field, value) in [
            ("accepted_quantity", change.accepted),
            ("rejected_quantity", change.rejected),
            ("damaged_quantity", change.damaged),
        ] {
            if let Some(value) = value {
                ensure_non_negative(line_no, field, value)?;
            }
        }

        let mut next = self.clone();
        if let Some(rejected) = change.rejected {
            next.rejected = rejected;
        }
        if let Some(damaged) = change.damaged {
            next.damaged = damaged;
        }
        match change.accepted {
            Some(accepted) => next.accepted = accepted,
            None if change.rejected.is_some() || change.damaged.is_some() => {
                next.accepted = (received - next.rejected - next.damaged).max(0.0);
            }
            None => {}
        }

        if next.total() > received + EPSILON {
            return Err(ReceivingError::DispositionOverflow {
                line_no,
                accepted: next.accepted,
                rejected: next.rejected,
                damaged: next.damaged,
                received,
            });
        }

        let quantities_changed = change.touches_quantities();
        let derived = QualityStatus::derive(received, &next);
        next.status = match change.status {
            Some(explicit) if quantities_changed && explicit != derived => {
                tracing::warn!(
                    line_no,
                    requested = ?explicit,
                    applied = ?derived,
                    "quality status overridden by quantities"
                );
                derived
            }
            Some(explicit) => explicit,
            None if quantities_changed => derived,
            None => self.status,
        };

        Ok(next)
    }
}
