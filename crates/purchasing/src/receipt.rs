//! Receipt inputs and the receipt history kept on a purchase order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyerp_core::{Entity, entity};

use crate::ledger::{self, OrderLineItem};
use crate::quality::{QualityChange, QualitySplit};

/// One line of a goods-receipt submission (transient engine input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineEntry {
    pub line_no: u32,
    pub received_quantity: f64,
    /// Pro-rated from the ordered weight-per-unit when absent.
    #[serde(default)]
    pub received_weight: Option<f64>,
    #[serde(default)]
    pub quality: Option<QualityChange>,
    /// Close the line out regardless of remaining variance.
    #[serde(default)]
    pub mark_as_complete: bool,
}

impl ReceiptLineEntry {
    pub fn new(line_no: u32, received_quantity: f64) -> Self {
        Self {
            line_no,
            received_quantity,
            received_weight: None,
            quality: None,
            mark_as_complete: false,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.received_weight = Some(weight);
        self
    }

    pub fn with_quality(mut self, change: QualityChange) -> Self {
        self.quality = Some(change);
        self
    }

    pub fn completing(mut self) -> Self {
        self.mark_as_complete = true;
        self
    }
}

/// A receipt line as recorded in the order's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecordLine {
    pub line_no: u32,
    pub quantity: f64,
    /// `None` when no weight was entered at the dock.
    pub weight: Option<f64>,
    #[serde(default)]
    pub quality: QualitySplit,
}

impl Entity for ReceiptRecordLine {
    type Id = u32;

    fn id(&self) -> &u32 {
        &self.line_no
    }
}

impl ReceiptRecordLine {
    /// Weight of this line, pro-rated when it was never recorded.
    pub fn effective_weight(&self, item: &OrderLineItem) -> f64 {
        ledger::backfill_weight(self.quantity, self.weight, item)
    }
}

/// One applied receipt event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub receipt_no: u32,
    pub occurred_at: DateTime<Utc>,
    pub lines: Vec<ReceiptRecordLine>,
}

impl Entity for ReceiptRecord {
    type Id = u32;

    fn id(&self) -> &u32 {
        &self.receipt_no
    }
}

impl ReceiptRecord {
    pub fn line(&self, line_no: u32) -> Option<&ReceiptRecordLine> {
        entity::find(&self.lines, &line_no)
    }
}
