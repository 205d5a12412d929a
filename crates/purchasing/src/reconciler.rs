//! Receipt reconciliation: applies receipt events and quality checks to a
//! purchase order's lines.
//!
//! The reconciler never mutates its inputs. It validates the whole batch,
//! computes the updated lines on a working copy and hands the result back;
//! the aggregate commits it through an event. A failing entry therefore
//! leaves every line untouched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ReceivingError, ensure_non_negative};
use crate::ledger::{self, CumulativeBasis, EPSILON, LedgerSnapshot, OrderLineItem};
use crate::quality::QualitySplit;
use crate::receipt::{ReceiptLineEntry, ReceiptRecordLine};

/// Receiving rules that vary per order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceivingPolicy {
    /// Percentage of the ordered quantity that may be received beyond the
    /// outstanding amount without closing the line manually.
    #[serde(default)]
    pub over_delivery_tolerance_percent: f64,
}

impl ReceivingPolicy {
    pub fn with_over_delivery_tolerance(percent: f64) -> Result<Self, ReceivingError> {
        let policy = Self {
            over_delivery_tolerance_percent: percent,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ReceivingError> {
        let pct = self.over_delivery_tolerance_percent;
        if !pct.is_finite() || pct < 0.0 {
            return Err(ReceivingError::InvalidPolicy(format!(
                "over-delivery tolerance must be a non-negative percentage, got {pct}"
            )));
        }
        Ok(())
    }

    fn allowance(&self, item: &OrderLineItem) -> f64 {
        item.ordered_quantity * self.over_delivery_tolerance_percent / 100.0
    }
}

/// Order-level receiving progress after a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptProgress {
    PartiallyReceived,
    FullyReceived,
}

/// Result of a successful [`ReceiptReconciler::apply_receipt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    /// All lines of the order, with updated totals.
    pub lines: Vec<OrderLineItem>,
    /// One snapshot per receipt entry, in entry order.
    pub snapshots: Vec<LedgerSnapshot>,
    /// What to append to the receipt history.
    pub records: Vec<ReceiptRecordLine>,
    /// `None` when the order status should stay as it is.
    pub progress: Option<ReceiptProgress>,
}

/// Lines a new receipt may be composed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "items", rename_all = "lowercase")]
pub enum ReceivableItems {
    Open(Vec<LedgerSnapshot>),
    /// Nothing left to receive.
    Closed,
}

impl ReceivableItems {
    pub fn is_closed(&self) -> bool {
        matches!(self, ReceivableItems::Closed)
    }

    pub fn items(&self) -> &[LedgerSnapshot] {
        match self {
            ReceivableItems::Open(items) => items,
            ReceivableItems::Closed => &[],
        }
    }
}

/// Reconciled quality split of one receipt line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOutcome {
    pub line_no: u32,
    pub received_quantity: f64,
    pub split: QualitySplit,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptReconciler {
    policy: ReceivingPolicy,
}

impl ReceiptReconciler {
    pub fn new(policy: ReceivingPolicy) -> Result<Self, ReceivingError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &ReceivingPolicy {
        &self.policy
    }

    /// Apply one receipt event to the order's lines.
    ///
    /// `lines` must carry committed (pre-event) totals.
    pub fn apply_receipt(
        &self,
        lines: &[OrderLineItem],
        entries: &[ReceiptLineEntry],
    ) -> Result<ReceiptOutcome, ReceivingError> {
        let index = validate_entries(lines, entries)?;

        let touches_anything = entries
            .iter()
            .any(|e| e.received_quantity > EPSILON || e.mark_as_complete);
        if !touches_anything {
            return Err(ReceivingError::EmptyReceipt);
        }

        let mut working = lines.to_vec();
        let mut snapshots = Vec::with_capacity(entries.len());
        let mut records = Vec::with_capacity(entries.len());

        for (entry, &idx) in entries.iter().zip(&index) {
            let item = &working[idx];
            let snapshot = ledger::snapshot(
                item,
                entry.received_quantity,
                entry.received_weight,
                entry.mark_as_complete,
                CumulativeBasis::ExcludesEvent,
            );

            if !entry.mark_as_complete {
                let outstanding = item.ordered_quantity - snapshot.previously_received_quantity
                    + self.policy.allowance(item);
                if entry.received_quantity > outstanding + EPSILON {
                    return Err(ReceivingError::OverReceipt {
                        line_no: entry.line_no,
                        received: entry.received_quantity,
                        outstanding: outstanding.max(0.0),
                    });
                }
            }

            let quality = match &entry.quality {
                Some(change) => {
                    QualitySplit::default().reconcile(entry.line_no, entry.received_quantity, change)?
                }
                None => QualitySplit::default(),
            };

            if entry.mark_as_complete && !item.manually_completed {
                let variance = item.ordered_quantity
                    - (snapshot.previously_received_quantity + snapshot.this_event_quantity);
                if variance.abs() > EPSILON {
                    tracing::warn!(
                        line_no = entry.line_no,
                        sku = %item.sku,
                        variance,
                        "line closed by manual completion with outstanding variance"
                    );
                }
            }

            tracing::debug!(
                line_no = entry.line_no,
                received = snapshot.this_event_quantity,
                weight = snapshot.this_event_weight,
                pending = snapshot.pending_quantity,
                completion = snapshot.completion_percent,
                disposition = ?snapshot.disposition,
                "receipt line reconciled"
            );

            let item = &mut working[idx];
            item.cumulative_received_quantity =
                snapshot.previously_received_quantity + snapshot.this_event_quantity;
            item.cumulative_received_weight =
                snapshot.previously_received_weight + snapshot.this_event_weight;
            item.manually_completed |= entry.mark_as_complete;

            records.push(ReceiptRecordLine {
                line_no: entry.line_no,
                quantity: entry.received_quantity,
                weight: entry.received_weight,
                quality,
            });
            snapshots.push(snapshot);
        }

        let progress = progress_of(&working);
        tracing::info!(
            lines = snapshots.len(),
            progress = ?progress,
            "receipt reconciled"
        );

        Ok(ReceiptOutcome {
            lines: working,
            snapshots,
            records,
            progress,
        })
    }

    /// Lines still open for receiving, seen with nothing received this time.
    pub fn select_receivable_items(&self, lines: &[OrderLineItem]) -> ReceivableItems {
        let open: Vec<LedgerSnapshot> = lines
            .iter()
            .filter(|item| !item.manually_completed)
            .map(ledger::committed)
            .filter(|s| s.pending_quantity > EPSILON)
            .collect();

        if open.is_empty() {
            ReceivableItems::Closed
        } else {
            ReceivableItems::Open(open)
        }
    }

    /// Reconcile the quality changes carried by `entries`.
    ///
    /// `prior` holds the current split per line; lines without one start from
    /// an uninspected split. Entries without a quality change are skipped.
    pub fn apply_quality_disposition(
        &self,
        entries: &[ReceiptLineEntry],
        prior: &HashMap<u32, QualitySplit>,
    ) -> Result<Vec<QualityOutcome>, ReceivingError> {
        let mut seen = HashSet::new();
        let mut outcomes = Vec::new();

        for entry in entries {
            if !seen.insert(entry.line_no) {
                return Err(ReceivingError::DuplicateLineItem {
                    line_no: entry.line_no,
                });
            }
            let Some(change) = &entry.quality else {
                continue;
            };
            let base = prior.get(&entry.line_no).cloned().unwrap_or_default();
            let split = base.reconcile(entry.line_no, entry.received_quantity, change)?;
            outcomes.push(QualityOutcome {
                line_no: entry.line_no,
                received_quantity: entry.received_quantity,
                split,
            });
        }

        tracing::info!(lines = outcomes.len(), "quality disposition reconciled");
        Ok(outcomes)
    }
}

/// Check every entry's figures and resolve it to an index into `lines`.
fn validate_entries(
    lines: &[OrderLineItem],
    entries: &[ReceiptLineEntry],
) -> Result<Vec<usize>, ReceivingError> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .iter()
        .map(|entry| {
            ensure_non_negative(entry.line_no, "received_quantity", entry.received_quantity)?;
            if let Some(weight) = entry.received_weight {
                ensure_non_negative(entry.line_no, "received_weight", weight)?;
            }
            if !seen.insert(entry.line_no) {
                return Err(ReceivingError::DuplicateLineItem {
                    line_no: entry.line_no,
                });
            }
            lines
                .iter()
                .position(|l| l.line_no == entry.line_no)
                .ok_or(ReceivingError::UnknownLineItem {
                    line_no: entry.line_no,
                })
        })
        .collect()
}

fn progress_of(lines: &[OrderLineItem]) -> Option<ReceiptProgress> {
    if lines.is_empty() {
        return None;
    }
    let views: Vec<LedgerSnapshot> = lines.iter().map(ledger::committed).collect();

    if views.iter().all(|s| s.pending_quantity <= EPSILON) {
        Some(ReceiptProgress::FullyReceived)
    } else if lines
        .iter()
        .any(|l| l.cumulative_received_quantity > EPSILON || l.manually_completed)
    {
        Some(ReceiptProgress::PartiallyReceived)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LineDisposition;
    use crate::quality::{QualityChange, QualityStatus};
    use proptest::prelude::*;

    fn rice() -> OrderLineItem {
        OrderLineItem::new(1, "RICE-25KG", 100.0, 500.0)
    }

    fn order() -> Vec<OrderLineItem> {
        vec![rice(), OrderLineItem::new(2, "SUGAR-50KG", 20.0, 1_000.0)]
    }

    fn reconciler() -> ReceiptReconciler {
        ReceiptReconciler::default()
    }

    #[test]
    fn first_partial_receipt_backfills_weight() {
        let outcome = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 40.0)])
            .unwrap();

        let s = &outcome.snapshots[0];
        assert_eq!(s.this_event_weight, 200.0);
        assert_eq!(s.previously_received_quantity, 0.0);
        assert_eq!(s.pending_quantity, 60.0);
        assert_eq!(s.pending_weight, 300.0);
        assert_eq!(s.completion_percent, 40);
        assert_eq!(s.disposition, LineDisposition::Partial);

        assert_eq!(outcome.lines[0].cumulative_received_quantity, 40.0);
        assert_eq!(outcome.lines[0].cumulative_received_weight, 200.0);
        assert_eq!(outcome.lines[1], order()[1]);
        assert_eq!(outcome.records[0].weight, None);
        assert_eq!(outcome.progress, Some(ReceiptProgress::PartiallyReceived));
    }

    #[test]
    fn over_receipt_is_rejected() {
        let first = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 40.0)])
            .unwrap();

        let err = reconciler()
            .apply_receipt(&first.lines, &[ReceiptLineEntry::new(1, 70.0)])
            .unwrap_err();
        assert_eq!(
            err,
            ReceivingError::OverReceipt {
                line_no: 1,
                received: 70.0,
                outstanding: 60.0,
            }
        );
    }

    #[test]
    fn manual_completion_closes_the_line() {
        let first = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 40.0)])
            .unwrap();
        let second = reconciler()
            .apply_receipt(&first.lines, &[ReceiptLineEntry::new(1, 60.0).completing()])
            .unwrap();

        let s = &second.snapshots[0];
        assert_eq!(s.previously_received_quantity, 40.0);
        assert_eq!(s.pending_quantity, 0.0);
        assert_eq!(s.pending_weight, 0.0);
        assert_eq!(s.completion_percent, 100);
        assert_eq!(s.disposition, LineDisposition::Complete);
        assert!(second.lines[0].manually_completed);
        assert_eq!(second.progress, Some(ReceiptProgress::PartiallyReceived));
    }

    #[test]
    fn manual_completion_allows_exceeding_outstanding() {
        let outcome = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 104.0).completing()])
            .unwrap();
        assert_eq!(outcome.lines[0].cumulative_received_quantity, 104.0);
        assert_eq!(outcome.snapshots[0].completion_percent, 100);
    }

    #[test]
    fn over_delivery_tolerance_is_honoured() {
        let reconciler =
            ReceiptReconciler::new(ReceivingPolicy::with_over_delivery_tolerance(5.0).unwrap())
                .unwrap();
        assert!(
            reconciler
                .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 105.0)])
                .is_ok()
        );
        assert!(matches!(
            reconciler.apply_receipt(&order(), &[ReceiptLineEntry::new(1, 106.0)]),
            Err(ReceivingError::OverReceipt { .. })
        ));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        assert!(matches!(
            ReceivingPolicy::with_over_delivery_tolerance(-1.0),
            Err(ReceivingError::InvalidPolicy(_))
        ));
        let policy = ReceivingPolicy {
            over_delivery_tolerance_percent: f64::INFINITY,
        };
        assert!(ReceiptReconciler::new(policy).is_err());
    }

    #[test]
    fn empty_receipt_is_rejected() {
        assert_eq!(
            reconciler().apply_receipt(&order(), &[]).unwrap_err(),
            ReceivingError::EmptyReceipt
        );
        assert_eq!(
            reconciler()
                .apply_receipt(
                    &order(),
                    &[ReceiptLineEntry::new(1, 0.0), ReceiptLineEntry::new(2, 0.0)]
                )
                .unwrap_err(),
            ReceivingError::EmptyReceipt
        );
    }

    #[test]
    fn completing_without_quantity_is_meaningful() {
        let outcome = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(2, 0.0).completing()])
            .unwrap();
        assert_eq!(outcome.snapshots[0].disposition, LineDisposition::Complete);
        assert_eq!(outcome.progress, Some(ReceiptProgress::PartiallyReceived));
    }

    #[test]
    fn unknown_and_duplicate_lines_are_rejected() {
        assert_eq!(
            reconciler()
                .apply_receipt(&order(), &[ReceiptLineEntry::new(9, 1.0)])
                .unwrap_err(),
            ReceivingError::UnknownLineItem { line_no: 9 }
        );
        assert_eq!(
            reconciler()
                .apply_receipt(
                    &order(),
                    &[ReceiptLineEntry::new(1, 1.0), ReceiptLineEntry::new(1, 2.0)]
                )
                .unwrap_err(),
            ReceivingError::DuplicateLineItem { line_no: 1 }
        );
    }

    #[test]
    fn negative_figures_are_rejected() {
        let err = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 5.0).with_weight(-2.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            ReceivingError::NegativeQuantity { line_no: 1, field: "received_weight", .. }
        ));
    }

    #[test]
    fn failing_entry_leaves_batch_unapplied() {
        let lines = order();
        let err = reconciler()
            .apply_receipt(
                &lines,
                &[ReceiptLineEntry::new(1, 40.0), ReceiptLineEntry::new(2, 25.0)],
            )
            .unwrap_err();
        assert!(matches!(err, ReceivingError::OverReceipt { line_no: 2, .. }));
        assert_eq!(lines, order());
    }

    #[test]
    fn fully_received_when_every_line_is_done() {
        let outcome = reconciler()
            .apply_receipt(
                &order(),
                &[
                    ReceiptLineEntry::new(1, 100.0).with_weight(497.5),
                    ReceiptLineEntry::new(2, 20.0),
                ],
            )
            .unwrap();
        assert_eq!(outcome.progress, Some(ReceiptProgress::FullyReceived));
        assert_eq!(outcome.lines[0].cumulative_received_weight, 497.5);
        assert_eq!(outcome.snapshots[0].pending_weight, 2.5);
        assert!(reconciler().select_receivable_items(&outcome.lines).is_closed());
    }

    #[test]
    fn receivable_items_exclude_done_and_manually_completed_lines() {
        let mut lines = order();
        lines.push(OrderLineItem::new(3, "SALT-1KG", 10.0, 10.0));
        lines[0].cumulative_received_quantity = 40.0;
        lines[1].cumulative_received_quantity = 20.0;
        lines[2].cumulative_received_quantity = 3.0;
        lines[2].manually_completed = true;

        let receivable = reconciler().select_receivable_items(&lines);
        let items = receivable.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_no, 1);
        assert_eq!(items[0].pending_quantity, 60.0);
        assert_eq!(items[0].this_event_quantity, 0.0);
    }

    #[test]
    fn quality_on_receipt_entry_is_recorded() {
        let change = QualityChange::default().with_rejected(5.0).with_damaged(3.0);
        let outcome = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 40.0).with_quality(change)])
            .unwrap();
        let quality = &outcome.records[0].quality;
        assert_eq!(quality.accepted, 32.0);
        assert_eq!(quality.status, QualityStatus::Partial);
    }

    #[test]
    fn quality_overflow_on_receipt_rejects_the_batch() {
        let change = QualityChange::default().with_rejected(41.0);
        let err = reconciler()
            .apply_receipt(&order(), &[ReceiptLineEntry::new(1, 40.0).with_quality(change)])
            .unwrap_err();
        assert!(matches!(err, ReceivingError::DispositionOverflow { .. }));
    }

    #[test]
    fn quality_disposition_uses_prior_split() {
        let mut prior = HashMap::new();
        prior.insert(
            1,
            QualitySplit {
                accepted: 35.0,
                rejected: 5.0,
                damaged: 0.0,
                status: QualityStatus::Partial,
            },
        );
        let entries = vec![
            ReceiptLineEntry::new(1, 40.0)
                .with_quality(QualityChange::default().with_damaged(3.0)),
            ReceiptLineEntry::new(2, 10.0),
        ];

        let outcomes = reconciler()
            .apply_quality_disposition(&entries, &prior)
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].split.accepted, 32.0);
        assert_eq!(outcomes[0].split.rejected, 5.0);
        assert_eq!(outcomes[0].split.status, QualityStatus::Partial);
    }

    #[test]
    fn quality_disposition_is_all_or_nothing() {
        let entries = vec![
            ReceiptLineEntry::new(1, 40.0)
                .with_quality(QualityChange::default().with_rejected(5.0)),
            ReceiptLineEntry::new(2, 10.0)
                .with_quality(QualityChange::default().with_rejected(-1.0)),
        ];
        let err = reconciler()
            .apply_quality_disposition(&entries, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ReceivingError::NegativeQuantity { line_no: 2, .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any run of accepted receipts without manual
        /// completion, pending + everything received equals the ordered
        /// quantity.
        #[test]
        fn pending_plus_received_equals_ordered(
            ordered in 1u32..1_000,
            receipts in prop::collection::vec(0u32..400, 1..12),
        ) {
            let mut lines = vec![OrderLineItem::new(1, "SKU", f64::from(ordered), f64::from(ordered) * 4.0)];
            let mut received = 0.0;

            for qty in receipts {
                let qty = f64::from(qty);
                match reconciler().apply_receipt(&lines, &[ReceiptLineEntry::new(1, qty)]) {
                    Ok(outcome) => {
                        received += qty;
                        let s = &outcome.snapshots[0];
                        prop_assert!((s.pending_quantity + received - f64::from(ordered)).abs() <= EPSILON);
                        prop_assert!(s.completion_percent <= 100);
                        lines = outcome.lines;
                    }
                    Err(err) => {
                        let expected = matches!(
                            err,
                            ReceivingError::OverReceipt { .. } | ReceivingError::EmptyReceipt
                        );
                        prop_assert!(expected);
                    }
                }
            }

            let view = ledger::committed(&lines[0]);
            prop_assert!((view.pending_quantity + received - f64::from(ordered)).abs() <= EPSILON);
        }
    }
}
