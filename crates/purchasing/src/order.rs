use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, entity};
use supplyerp_events::Event;

use crate::error::{PurchasingError, ReceivingError};
use crate::ledger::{self, LedgerSnapshot, OrderLineItem, Tally};
use crate::quality::QualitySplit;
use crate::receipt::{ReceiptLineEntry, ReceiptRecord, ReceiptRecordLine};
use crate::reconciler::{
    QualityOutcome, ReceiptProgress, ReceiptReconciler, ReceivableItems, ReceivingPolicy,
};

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier the order is placed with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Approved,
    PartiallyReceived,
    FullyReceived,
    Closed,
}

impl PurchaseOrderStatus {
    /// Label used by presentation collaborators.
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "Draft",
            PurchaseOrderStatus::Approved => "Approved",
            PurchaseOrderStatus::PartiallyReceived => "Partially_Received",
            PurchaseOrderStatus::FullyReceived => "Fully_Received",
            PurchaseOrderStatus::Closed => "Closed",
        }
    }

    fn after(self, progress: Option<ReceiptProgress>) -> Self {
        match progress {
            Some(ReceiptProgress::FullyReceived) => PurchaseOrderStatus::FullyReceived,
            Some(ReceiptProgress::PartiallyReceived) => PurchaseOrderStatus::PartiallyReceived,
            None => self,
        }
    }
}

/// Aggregate root: PurchaseOrder.
///
/// Owns the order lines and the receipt history. Line totals only ever change
/// through `GoodsReceived` events decided by the receipt reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    supplier_id: Option<SupplierId>,
    status: PurchaseOrderStatus,
    policy: ReceivingPolicy,
    lines: Vec<OrderLineItem>,
    receipts: Vec<ReceiptRecord>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier_id: None,
            status: PurchaseOrderStatus::Draft,
            policy: ReceivingPolicy::default(),
            lines: Vec::new(),
            receipts: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn policy(&self) -> &ReceivingPolicy {
        &self.policy
    }

    pub fn lines(&self) -> &[OrderLineItem] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLineItem> {
        entity::find(&self.lines, &line_no)
    }

    pub fn receipts(&self) -> &[ReceiptRecord] {
        &self.receipts
    }

    pub fn receipt(&self, receipt_no: u32) -> Option<&ReceiptRecord> {
        entity::find(&self.receipts, &receipt_no)
    }

    /// Lines a new receipt may be composed from.
    pub fn receivable_items(&self) -> ReceivableItems {
        ReceiptReconciler::default().select_receivable_items(&self.lines)
    }

    /// Committed ledger view of every line.
    pub fn ledger(&self) -> Vec<LedgerSnapshot> {
        self.lines.iter().map(ledger::committed).collect()
    }

    /// Totals of a line rebuilt from the receipt history.
    pub fn reconstructed_totals(&self, line_no: u32) -> Option<Tally> {
        let item = self.line(line_no)?;
        Some(ledger::reconstruct_totals(
            item,
            self.receipts.iter().flat_map(|r| r.lines.iter()),
        ))
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub policy: ReceivingPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub sku: String,
    pub ordered_quantity: f64,
    #[serde(default)]
    pub ordered_weight: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods (one receipt event over some of the lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub entries: Vec<ReceiptLineEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordQualityCheck against an already applied receipt.
///
/// The received quantity of each entry is taken from the recorded receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQualityCheck {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_no: u32,
    pub entries: Vec<ReceiptLineEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseOrder (only once fully received).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    Approve(Approve),
    ReceiveGoods(ReceiveGoods),
    RecordQualityCheck(RecordQualityCheck),
    CloseOrder(CloseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub policy: ReceivingPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderLineAdded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub sku: String,
    pub ordered_quantity: f64,
    pub ordered_weight: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the committed line totals after the receipt, so applying it never
/// recomputes anything. Stock projections read `lines` for the received
/// quantities per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_no: u32,
    pub lines: Vec<ReceiptRecordLine>,
    pub updated_lines: Vec<OrderLineItem>,
    pub snapshots: Vec<LedgerSnapshot>,
    pub status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QualityChecked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityChecked {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_no: u32,
    pub dispositions: Vec<QualityOutcome>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderClosed {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLineAdded(PurchaseOrderLineAdded),
    PurchaseOrderApproved(PurchaseOrderApproved),
    GoodsReceived(GoodsReceived),
    QualityChecked(QualityChecked),
    PurchaseOrderClosed(PurchaseOrderClosed),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::QualityChecked(_) => "purchasing.order.quality_checked",
            PurchaseOrderEvent::PurchaseOrderClosed(_) => "purchasing.order.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::QualityChecked(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = PurchasingError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier_id = Some(e.supplier_id);
                self.policy = e.policy;
                self.status = PurchaseOrderStatus::Draft;
                self.lines.clear();
                self.receipts.clear();
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => {
                self.lines.push(OrderLineItem::new(
                    e.line_no,
                    e.sku.clone(),
                    e.ordered_quantity,
                    e.ordered_weight,
                ));
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => {
                self.status = PurchaseOrderStatus::Approved;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                self.lines = e.updated_lines.clone();
                self.receipts.push(ReceiptRecord {
                    receipt_no: e.receipt_no,
                    occurred_at: e.occurred_at,
                    lines: e.lines.clone(),
                });
                self.status = e.status;
            }
            PurchaseOrderEvent::QualityChecked(e) => {
                if let Some(receipt) = entity::find_mut(&mut self.receipts, &e.receipt_no) {
                    for outcome in &e.dispositions {
                        if let Some(line) = entity::find_mut(&mut receipt.lines, &outcome.line_no) {
                            line.quality = outcome.split.clone();
                        }
                    }
                }
            }
            PurchaseOrderEvent::PurchaseOrderClosed(_) => {
                self.status = PurchaseOrderStatus::Closed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::Approve(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::RecordQualityCheck(cmd) => self.handle_quality_check(cmd),
            PurchaseOrderCommand::CloseOrder(cmd) => self.handle_close(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_order_id(order_id)
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists").into());
        }
        cmd.policy.validate()?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                supplier_id: cmd.supplier_id,
                policy: cmd.policy,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "cannot modify purchase order once approved or received",
            )
            .into());
        }

        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty").into());
        }
        if !(cmd.ordered_quantity.is_finite() && cmd.ordered_quantity > 0.0) {
            return Err(DomainError::validation("ordered quantity must be positive").into());
        }
        if !(cmd.ordered_weight.is_finite() && cmd.ordered_weight >= 0.0) {
            return Err(DomainError::validation("ordered weight cannot be negative").into());
        }

        let next_line_no = (self.lines.len() as u32) + 1;
        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineAdded(
            PurchaseOrderLineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: next_line_no,
                sku: cmd.sku.trim().to_string(),
                ordered_quantity: cmd.ordered_quantity,
                ordered_weight: cmd.ordered_weight,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(
                DomainError::invariant("only draft purchase orders can be approved").into(),
            );
        }

        if self.lines.is_empty() {
            return Err(
                DomainError::validation("cannot approve purchase order without lines").into(),
            );
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(
            PurchaseOrderApproved {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(
        &self,
        cmd: &ReceiveGoods,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        match self.status {
            PurchaseOrderStatus::Approved | PurchaseOrderStatus::PartiallyReceived => {}
            PurchaseOrderStatus::Draft => {
                return Err(DomainError::invariant(
                    "cannot receive goods before purchase order is approved",
                )
                .into());
            }
            PurchaseOrderStatus::FullyReceived | PurchaseOrderStatus::Closed => {
                return Err(PurchasingError::AlreadyClosed);
            }
        }

        if self.receivable_items().is_closed() {
            return Err(PurchasingError::AlreadyClosed);
        }

        let outcome = ReceiptReconciler::new(self.policy)?.apply_receipt(&self.lines, &cmd.entries)?;
        let receipt_no = self.receipts.len() as u32 + 1;
        tracing::info!(
            order_id = %self.id,
            receipt_no,
            lines = outcome.records.len(),
            "goods receipt accepted"
        );

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt_no,
            lines: outcome.records,
            updated_lines: outcome.lines,
            snapshots: outcome.snapshots,
            status: self.status.after(outcome.progress),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_quality_check(
        &self,
        cmd: &RecordQualityCheck,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status == PurchaseOrderStatus::Closed {
            return Err(DomainError::invariant("purchase order is closed").into());
        }

        let receipt = self
            .receipt(cmd.receipt_no)
            .ok_or_else(DomainError::not_found)?;

        // The recorded receipt is authoritative for what arrived.
        let mut prior: HashMap<u32, QualitySplit> = HashMap::new();
        let mut entries = Vec::with_capacity(cmd.entries.len());
        for entry in &cmd.entries {
            let recorded = receipt
                .line(entry.line_no)
                .ok_or(ReceivingError::UnknownLineItem {
                    line_no: entry.line_no,
                })?;
            prior.insert(recorded.line_no, recorded.quality.clone());
            entries.push(ReceiptLineEntry {
                received_quantity: recorded.quantity,
                ..entry.clone()
            });
        }

        let dispositions =
            ReceiptReconciler::new(self.policy)?.apply_quality_disposition(&entries, &prior)?;
        if dispositions.is_empty() {
            return Err(DomainError::validation("quality check changes nothing").into());
        }
        tracing::info!(
            order_id = %self.id,
            receipt_no = cmd.receipt_no,
            lines = dispositions.len(),
            "quality check recorded"
        );

        Ok(vec![PurchaseOrderEvent::QualityChecked(QualityChecked {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt_no: cmd.receipt_no,
            dispositions,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseOrder) -> Result<Vec<PurchaseOrderEvent>, PurchasingError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::FullyReceived {
            return Err(DomainError::invariant(
                "only fully received purchase orders can be closed",
            )
            .into());
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderClosed(
            PurchaseOrderClosed {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
