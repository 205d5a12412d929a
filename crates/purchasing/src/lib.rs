//! Purchasing domain module: purchase orders and goods-receipt reconciliation.
//!
//! Business rules only (no IO, no HTTP, no storage). The partial-fulfillment
//! engine lives in [`ledger`] (per-line figures) and [`reconciler`] (receipt
//! events and quality checks over a whole order); the event-sourced
//! [`order::PurchaseOrder`] aggregate is the only place line totals change.

pub mod error;
pub mod ledger;
pub mod order;
pub mod quality;
pub mod receipt;
pub mod reconciler;

pub use error::{PurchasingError, ReceivingError};
pub use ledger::{
    CumulativeBasis, LedgerSnapshot, LineDisposition, OrderLineItem, Tally, backfill_weight,
    completion_percent, disposition, pending, previously_received, previously_received_weight,
    weight_per_unit,
};
pub use order::{
    AddLine, Approve, CloseOrder, CreatePurchaseOrder, GoodsReceived, PurchaseOrder,
    PurchaseOrderApproved, PurchaseOrderClosed, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderLineAdded, PurchaseOrderStatus,
    QualityChecked, ReceiveGoods, RecordQualityCheck, SupplierId,
};
pub use quality::{QualityChange, QualitySplit, QualityStatus};
pub use receipt::{ReceiptLineEntry, ReceiptRecord, ReceiptRecordLine};
pub use reconciler::{
    QualityOutcome, ReceiptOutcome, ReceiptProgress, ReceiptReconciler, ReceivableItems,
    ReceivingPolicy,
};
