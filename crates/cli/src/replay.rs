//! Command replay against a single purchase order.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyerp_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion, TenantId};
use supplyerp_events::EventEnvelope;
use supplyerp_purchasing::{
    AddLine, Approve, CloseOrder, CreatePurchaseOrder, LedgerSnapshot, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, PurchasingError, ReceiptLineEntry,
    ReceivableItems, ReceiveGoods, ReceivingPolicy, RecordQualityCheck, SupplierId,
};

pub const AGGREGATE_TYPE: &str = "purchasing.order";

/// A scripted sequence of commands against one purchase order.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub order_id: Option<PurchaseOrderId>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(input: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(input)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Version the order must be at before this step runs.
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    pub command: StepCommand,
}

/// Commands as written in a scenario; tenant and order ids are filled in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCommand {
    Create {
        supplier_id: Option<SupplierId>,
        policy: Option<ReceivingPolicy>,
    },
    AddLine {
        sku: String,
        ordered_quantity: f64,
        #[serde(default)]
        ordered_weight: f64,
    },
    Approve,
    Receive {
        entries: Vec<ReceiptLineEntry>,
    },
    QualityCheck {
        receipt_no: u32,
        entries: Vec<ReceiptLineEntry>,
    },
    Close,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid scenario: {0}")]
    Scenario(#[from] serde_json::Error),

    #[error("step {step} rejected: {source}")]
    Rejected {
        step: usize,
        #[source]
        source: PurchasingError,
    },

    #[error("writing replay output: {0}")]
    Output(#[from] io::Error),
}

/// End-of-replay view handed to presentation.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub order_id: PurchaseOrderId,
    pub status: &'static str,
    pub version: u64,
    pub receipts: usize,
    pub ledger: Vec<LedgerSnapshot>,
    pub receivable: ReceivableItems,
}

/// In-memory dispatcher for one order stream.
#[derive(Debug)]
pub struct Replay {
    tenant_id: TenantId,
    order_id: PurchaseOrderId,
    default_policy: ReceivingPolicy,
    order: PurchaseOrder,
    log: Vec<EventEnvelope<PurchaseOrderEvent>>,
}

impl Replay {
    pub fn new(
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        default_policy: ReceivingPolicy,
    ) -> Self {
        Self {
            tenant_id,
            order_id,
            default_policy,
            order: PurchaseOrder::empty(order_id),
            log: Vec::new(),
        }
    }

    pub fn for_scenario(scenario: &Scenario, default_policy: ReceivingPolicy) -> Self {
        Self::new(
            scenario.tenant_id.unwrap_or_default(),
            scenario
                .order_id
                .unwrap_or_else(|| PurchaseOrderId::new(AggregateId::new())),
            default_policy,
        )
    }

    pub fn order(&self) -> &PurchaseOrder {
        &self.order
    }

    pub fn log(&self) -> &[EventEnvelope<PurchaseOrderEvent>] {
        &self.log
    }

    /// Check the expected version, decide, then apply and record the events.
    ///
    /// Nothing is applied when the version check or the command fails.
    pub fn dispatch(
        &mut self,
        expected: ExpectedVersion,
        command: &PurchaseOrderCommand,
    ) -> Result<Vec<EventEnvelope<PurchaseOrderEvent>>, PurchasingError> {
        expected.check(self.order.version())?;
        let events = self.order.handle(command)?;

        let mut envelopes = Vec::with_capacity(events.len());
        for event in events {
            self.order.apply(&event);
            envelopes.push(EventEnvelope::wrap(
                self.tenant_id,
                self.order_id.0,
                AGGREGATE_TYPE,
                self.order.version(),
                event,
            ));
        }
        self.log.extend(envelopes.iter().cloned());
        Ok(envelopes)
    }

    pub fn run_step(
        &mut self,
        step: &Step,
    ) -> Result<Vec<EventEnvelope<PurchaseOrderEvent>>, PurchasingError> {
        let command = self.command_for(step);
        tracing::debug!(command = ?command, "dispatching");
        self.dispatch(ExpectedVersion::from(step.expected_version), &command)
    }

    fn command_for(&self, step: &Step) -> PurchaseOrderCommand {
        let tenant_id = self.tenant_id;
        let order_id = self.order_id;
        let occurred_at = step.occurred_at.unwrap_or_else(Utc::now);

        match &step.command {
            StepCommand::Create {
                supplier_id,
                policy,
            } => PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                supplier_id: supplier_id.unwrap_or_else(|| SupplierId::new(AggregateId::new())),
                policy: policy.unwrap_or(self.default_policy),
                occurred_at,
            }),
            StepCommand::AddLine {
                sku,
                ordered_quantity,
                ordered_weight,
            } => PurchaseOrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                sku: sku.clone(),
                ordered_quantity: *ordered_quantity,
                ordered_weight: *ordered_weight,
                occurred_at,
            }),
            StepCommand::Approve => PurchaseOrderCommand::Approve(Approve {
                tenant_id,
                order_id,
                occurred_at,
            }),
            StepCommand::Receive { entries } => PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                tenant_id,
                order_id,
                entries: entries.clone(),
                occurred_at,
            }),
            StepCommand::QualityCheck {
                receipt_no,
                entries,
            } => PurchaseOrderCommand::RecordQualityCheck(RecordQualityCheck {
                tenant_id,
                order_id,
                receipt_no: *receipt_no,
                entries: entries.clone(),
                occurred_at,
            }),
            StepCommand::Close => PurchaseOrderCommand::CloseOrder(CloseOrder {
                tenant_id,
                order_id,
                occurred_at,
            }),
        }
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            order_id: self.order_id,
            status: self.order.status().as_str(),
            version: self.order.version(),
            receipts: self.order.receipts().len(),
            ledger: self.order.ledger(),
            receivable: self.order.receivable_items(),
        }
    }
}

/// Replay every step, stopping at the first rejected one.
pub fn run(scenario: &Scenario, default_policy: ReceivingPolicy) -> Result<Replay, ReplayError> {
    run_with(scenario, default_policy, |_| Ok(()))
}

/// Like [`run`], handing each envelope to `on_envelope` as soon as its step
/// is applied.
pub fn run_with(
    scenario: &Scenario,
    default_policy: ReceivingPolicy,
    mut on_envelope: impl FnMut(&EventEnvelope<PurchaseOrderEvent>) -> io::Result<()>,
) -> Result<Replay, ReplayError> {
    let mut replay = Replay::for_scenario(scenario, default_policy);

    for (index, step) in scenario.steps.iter().enumerate() {
        let step_no = index + 1;
        let _span = tracing::info_span!("step", step = step_no).entered();
        let envelopes = replay.run_step(step).map_err(|source| {
            tracing::error!(step = step_no, error = %source, "step rejected");
            ReplayError::Rejected {
                step: step_no,
                source,
            }
        })?;
        for envelope in &envelopes {
            on_envelope(envelope)?;
        }
    }

    tracing::info!(
        order_id = %replay.order_id,
        events = replay.log.len(),
        status = replay.order.status().as_str(),
        "scenario replayed"
    );
    Ok(replay)
}
