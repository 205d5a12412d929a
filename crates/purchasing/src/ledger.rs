//! Fulfillment ledger: received / pending / completion figures for one line.
//!
//! Everything here is a pure function of its arguments. The count↔weight
//! ratio is only ever computed by [`weight_per_unit`]; every pro-ration goes
//! through [`backfill_weight`].

use serde::{Deserialize, Serialize};

use supplyerp_core::{Entity, ValueObject};

use crate::receipt::ReceiptRecordLine;

/// Absorbs floating-point noise when comparing quantities against zero.
pub const EPSILON: f64 = 1e-9;

/// Purchase-order line: ordered facts plus running received totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub line_no: u32,
    pub sku: String,
    /// Ordered count (e.g. bags).
    pub ordered_quantity: f64,
    /// Ordered weight (e.g. kg); 0 means the line is not tracked by weight.
    pub ordered_weight: f64,
    #[serde(default)]
    pub cumulative_received_quantity: f64,
    #[serde(default)]
    pub cumulative_received_weight: f64,
    #[serde(default)]
    pub manually_completed: bool,
}

impl OrderLineItem {
    pub fn new(
        line_no: u32,
        sku: impl Into<String>,
        ordered_quantity: f64,
        ordered_weight: f64,
    ) -> Self {
        Self {
            line_no,
            sku: sku.into(),
            ordered_quantity,
            ordered_weight,
            cumulative_received_quantity: 0.0,
            cumulative_received_weight: 0.0,
            manually_completed: false,
        }
    }

    pub fn is_weight_tracked(&self) -> bool {
        weight_per_unit(self) > 0.0
    }
}

impl Entity for OrderLineItem {
    type Id = u32;

    fn id(&self) -> &u32 {
        &self.line_no
    }
}

/// Whether a cumulative total already contains the event being evaluated.
///
/// Totals read back from a committed line exclude the in-progress event;
/// totals read after the event was saved include it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CumulativeBasis {
    #[default]
    ExcludesEvent,
    IncludesEvent,
}

/// Fulfillment state of a line (`Pending → Partial → Complete`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineDisposition {
    Pending,
    Partial,
    Complete,
}

/// A quantity together with its weight.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub quantity: f64,
    pub weight: f64,
}

impl Tally {
    pub const ZERO: Tally = Tally {
        quantity: 0.0,
        weight: 0.0,
    };

    pub fn new(quantity: f64, weight: f64) -> Self {
        Self { quantity, weight }
    }
}

impl ValueObject for Tally {}

/// Ledger figures of one line after (hypothetically) applying one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub line_no: u32,
    pub this_event_quantity: f64,
    pub this_event_weight: f64,
    pub previously_received_quantity: f64,
    pub previously_received_weight: f64,
    pub pending_quantity: f64,
    pub pending_weight: f64,
    pub completion_percent: u8,
    pub disposition: LineDisposition,
    pub manually_completed: bool,
}

impl ValueObject for LedgerSnapshot {}

/// Ordered weight per ordered unit, or `0.0` when weight is not tracked.
pub fn weight_per_unit(item: &OrderLineItem) -> f64 {
    if item.ordered_quantity > 0.0 && item.ordered_weight > 0.0 {
        item.ordered_weight / item.ordered_quantity
    } else {
        0.0
    }
}

/// The explicit weight if one was given, else `quantity` pro-rated.
pub fn backfill_weight(quantity: f64, explicit: Option<f64>, item: &OrderLineItem) -> f64 {
    match explicit {
        Some(weight) => weight,
        None => quantity * weight_per_unit(item),
    }
}

/// Quantity received before the event being evaluated.
pub fn previously_received(
    item: &OrderLineItem,
    this_event_quantity: f64,
    basis: CumulativeBasis,
) -> f64 {
    let previous = match basis {
        CumulativeBasis::ExcludesEvent => item.cumulative_received_quantity,
        CumulativeBasis::IncludesEvent => item.cumulative_received_quantity - this_event_quantity,
    };
    previous.max(0.0)
}

/// Weight received before the event being evaluated.
///
/// Older receipts may never have stored a weight; when the stored total is
/// zero but `previous_quantity` says goods arrived, the weight is pro-rated.
pub fn previously_received_weight(
    item: &OrderLineItem,
    previous_quantity: f64,
    this_event_weight: f64,
    basis: CumulativeBasis,
) -> f64 {
    if item.cumulative_received_weight <= EPSILON && previous_quantity > EPSILON {
        return backfill_weight(previous_quantity, None, item);
    }
    let previous = match basis {
        CumulativeBasis::ExcludesEvent => item.cumulative_received_weight,
        CumulativeBasis::IncludesEvent => item.cumulative_received_weight - this_event_weight,
    };
    previous.max(0.0)
}

/// Remaining quantity and weight, clamped at zero.
///
/// A manually completed line (item flag or per-event override) has nothing
/// pending whatever the arithmetic says.
pub fn pending(
    item: &OrderLineItem,
    previous: Tally,
    this_event: Tally,
    manually_completed: bool,
) -> Tally {
    if manually_completed || item.manually_completed {
        return Tally::ZERO;
    }

    let quantity = remaining(item.ordered_quantity, previous.quantity + this_event.quantity);
    let weight = if item.is_weight_tracked() {
        remaining(item.ordered_weight, previous.weight + this_event.weight)
    } else {
        0.0
    };
    Tally { quantity, weight }
}

fn remaining(ordered: f64, received: f64) -> f64 {
    let left = ordered - received;
    if left <= EPSILON { 0.0 } else { left }
}

/// Share of the ordered quantity received so far, 0..=100.
pub fn completion_percent(
    item: &OrderLineItem,
    previous_quantity: f64,
    this_event_quantity: f64,
) -> u8 {
    if item.ordered_quantity <= 0.0 {
        return 0;
    }
    let ratio = (previous_quantity + this_event_quantity) / item.ordered_quantity;
    (100.0 * ratio).round().clamp(0.0, 100.0) as u8
}

/// Classify a line from its pending quantity and everything received so far.
pub fn disposition(
    pending_quantity: f64,
    received_quantity: f64,
    manually_completed: bool,
) -> LineDisposition {
    let received = received_quantity > EPSILON;
    if manually_completed || (received && pending_quantity <= EPSILON) {
        LineDisposition::Complete
    } else if received {
        LineDisposition::Partial
    } else {
        LineDisposition::Pending
    }
}

/// Full ledger view of `item` for one event.
pub fn snapshot(
    item: &OrderLineItem,
    this_event_quantity: f64,
    this_event_weight: Option<f64>,
    mark_as_complete: bool,
    basis: CumulativeBasis,
) -> LedgerSnapshot {
    let this_event = Tally::new(
        this_event_quantity,
        backfill_weight(this_event_quantity, this_event_weight, item),
    );
    let previous_quantity = previously_received(item, this_event.quantity, basis);
    let previous = Tally::new(
        previous_quantity,
        previously_received_weight(item, previous_quantity, this_event.weight, basis),
    );
    let manually_completed = mark_as_complete || item.manually_completed;
    let outstanding = pending(item, previous, this_event, manually_completed);

    LedgerSnapshot {
        line_no: item.line_no,
        this_event_quantity: this_event.quantity,
        this_event_weight: this_event.weight,
        previously_received_quantity: previous.quantity,
        previously_received_weight: previous.weight,
        pending_quantity: outstanding.quantity,
        pending_weight: outstanding.weight,
        completion_percent: completion_percent(item, previous.quantity, this_event.quantity),
        disposition: disposition(
            outstanding.quantity,
            previous.quantity + this_event.quantity,
            manually_completed,
        ),
        manually_completed,
    }
}

/// The committed view of a line, with nothing received this time.
pub fn committed(item: &OrderLineItem) -> LedgerSnapshot {
    snapshot(item, 0.0, None, false, CumulativeBasis::ExcludesEvent)
}

/// State of a line from its committed totals.
pub fn line_state(item: &OrderLineItem) -> LineDisposition {
    committed(item).disposition
}

/// Rebuild the cumulative totals of `item` from receipt history.
///
/// Lines of other items are skipped; missing weights are pro-rated. The
/// running weight is healed before each receipt exactly as
/// [`previously_received_weight`] heals a stored zero, so the rebuilt totals
/// agree with the committed ones.
pub fn reconstruct_totals<'a>(
    item: &OrderLineItem,
    history: impl IntoIterator<Item = &'a ReceiptRecordLine>,
) -> Tally {
    history
        .into_iter()
        .filter(|line| line.line_no == item.line_no)
        .fold(Tally::ZERO, |acc, line| {
            let before = if acc.weight <= EPSILON && acc.quantity > EPSILON {
                backfill_weight(acc.quantity, None, item)
            } else {
                acc.weight
            };
            Tally {
                quantity: acc.quantity + line.quantity,
                weight: before + line.effective_weight(item),
            }
        })
}
