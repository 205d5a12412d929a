use std::io;

use serde_json::{Value, json};

use supplyerp_cli::{ReplayError, Scenario, run, run_with};
use supplyerp_core::DomainError;
use supplyerp_purchasing::{
    LineDisposition, PurchaseOrderEvent, PurchaseOrderStatus, PurchasingError, QualityStatus,
    ReceivingError, ReceivingPolicy,
};

fn scenario(steps: Value) -> Scenario {
    Scenario::from_json(&json!({ "steps": steps }).to_string()).unwrap()
}

/// Create, add one 100 bag / 500 kg line, approve.
fn approved_rice_order() -> Vec<Value> {
    vec![
        json!({ "command": { "create": {} } }),
        json!({ "command": { "add_line": { "sku": "RICE-25KG", "ordered_quantity": 100.0, "ordered_weight": 500.0 } } }),
        json!({ "command": "approve" }),
    ]
}

fn with_steps(extra: Vec<Value>) -> Scenario {
    let mut steps = approved_rice_order();
    steps.extend(extra);
    scenario(Value::Array(steps))
}

#[test]
fn partial_then_final_delivery_closes_the_order() {
    let replay = run(
        &with_steps(vec![
            json!({ "expected_version": 3, "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 40.0 } ] } } }),
            json!({ "expected_version": 4, "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 60.0, "received_weight": 300.0 } ] } } }),
            json!({ "command": "close" }),
        ]),
        ReceivingPolicy::default(),
    )
    .unwrap();

    let first = replay
        .log()
        .iter()
        .find_map(|envelope| match envelope.payload() {
            PurchaseOrderEvent::GoodsReceived(e) if e.receipt_no == 1 => Some(e.clone()),
            _ => None,
        })
        .unwrap();
    let snapshot = &first.snapshots[0];
    assert_eq!(snapshot.this_event_quantity, 40.0);
    assert_eq!(snapshot.this_event_weight, 200.0);
    assert_eq!(snapshot.pending_quantity, 60.0);
    assert_eq!(snapshot.pending_weight, 300.0);
    assert_eq!(snapshot.completion_percent, 40);
    assert_eq!(snapshot.disposition, LineDisposition::Partial);
    assert_eq!(first.status, PurchaseOrderStatus::PartiallyReceived);

    let summary = replay.summary();
    assert_eq!(summary.status, "Closed");
    assert_eq!(summary.version, 6);
    assert_eq!(summary.receipts, 2);
    assert!(summary.receivable.is_closed());
    assert_eq!(summary.ledger[0].previously_received_quantity, 100.0);
    assert_eq!(summary.ledger[0].previously_received_weight, 500.0);
    assert_eq!(summary.ledger[0].disposition, LineDisposition::Complete);
}

#[test]
fn envelopes_carry_stream_sequence() {
    let replay = run(&with_steps(vec![]), ReceivingPolicy::default()).unwrap();

    let sequence: Vec<u64> = replay.log().iter().map(|e| e.sequence_number()).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert!(replay.log().iter().all(|e| e.aggregate_type() == "purchasing.order"));
    assert_eq!(replay.log()[0].event_type(), "purchasing.order.created");
}

#[test]
fn over_receipt_stops_the_replay() {
    let err = run(
        &with_steps(vec![
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 90.0 } ] } } }),
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 20.0 } ] } } }),
        ]),
        ReceivingPolicy::default(),
    )
    .unwrap_err();

    match err {
        ReplayError::Rejected {
            step,
            source: PurchasingError::Receiving(ReceivingError::OverReceipt { line_no, .. }),
        } => {
            assert_eq!(step, 5);
            assert_eq!(line_no, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn tolerance_admits_small_over_delivery() {
    let replay = run(
        &with_steps(vec![
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 90.0 } ] } } }),
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 12.0 } ] } } }),
        ]),
        ReceivingPolicy::with_over_delivery_tolerance(5.0).unwrap(),
    )
    .unwrap();

    let summary = replay.summary();
    assert_eq!(summary.status, "Fully_Received");
    assert_eq!(summary.ledger[0].completion_percent, 100);
    assert_eq!(summary.ledger[0].pending_quantity, 0.0);
}

#[test]
fn stale_expected_version_is_a_conflict() {
    let err = run(
        &with_steps(vec![json!({
            "expected_version": 2,
            "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 10.0 } ] } }
        })]),
        ReceivingPolicy::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ReplayError::Rejected {
            step: 4,
            source: PurchasingError::Domain(DomainError::Conflict(_)),
        }
    ));
}

#[test]
fn manual_completion_closes_a_short_line() {
    let replay = run(
        &with_steps(vec![json!({
            "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 90.0, "mark_as_complete": true } ] } }
        })]),
        ReceivingPolicy::default(),
    )
    .unwrap();

    let summary = replay.summary();
    assert_eq!(summary.status, "Fully_Received");
    assert!(summary.ledger[0].manually_completed);
    assert_eq!(summary.ledger[0].completion_percent, 90);
    assert_eq!(summary.ledger[0].disposition, LineDisposition::Complete);
}

#[test]
fn quality_check_uses_the_recorded_quantity() {
    let replay = run(
        &with_steps(vec![
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 40.0 } ] } } }),
            json!({ "command": { "quality_check": { "receipt_no": 1, "entries": [
                { "line_no": 1, "received_quantity": 0.0, "quality": { "rejected": 5.0, "damaged": 3.0 } }
            ] } } }),
        ]),
        ReceivingPolicy::default(),
    )
    .unwrap();

    let receipt = replay.order().receipt(1).unwrap();
    let split = &receipt.lines[0].quality;
    assert_eq!(split.accepted, 32.0);
    assert_eq!(split.rejected, 5.0);
    assert_eq!(split.damaged, 3.0);
    assert_eq!(split.status, QualityStatus::Partial);
}

#[test]
fn quality_overflow_is_rejected() {
    let err = run(
        &with_steps(vec![
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 40.0 } ] } } }),
            json!({ "command": { "quality_check": { "receipt_no": 1, "entries": [
                { "line_no": 1, "received_quantity": 40.0, "quality": { "accepted": 35.0, "rejected": 10.0 } }
            ] } } }),
        ]),
        ReceivingPolicy::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ReplayError::Rejected {
            step: 5,
            source: PurchasingError::Receiving(ReceivingError::DispositionOverflow { .. }),
        }
    ));
}

#[test]
fn envelopes_are_streamed_step_by_step() {
    let mut seen = Vec::new();
    let err = run_with(
        &with_steps(vec![
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 40.0 } ] } } }),
            json!({ "command": { "receive": { "entries": [ { "line_no": 1, "received_quantity": 70.0 } ] } } }),
        ]),
        ReceivingPolicy::default(),
        |envelope| {
            seen.push(envelope.event_type().to_string());
            Ok(())
        },
    )
    .unwrap_err();

    assert!(matches!(err, ReplayError::Rejected { step: 5, .. }));
    assert_eq!(
        seen,
        vec![
            "purchasing.order.created",
            "purchasing.order.line_added",
            "purchasing.order.approved",
            "purchasing.order.goods_received",
        ]
    );
}

#[test]
fn output_failure_stops_the_replay() {
    let err = run_with(&with_steps(vec![]), ReceivingPolicy::default(), |_| {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    })
    .unwrap_err();

    assert!(matches!(err, ReplayError::Output(_)));
}

#[test]
fn malformed_scenario_is_reported() {
    let err = Scenario::from_json(r#"{ "steps": [ { "command": "teleport" } ] }"#).unwrap_err();
    assert!(matches!(err, ReplayError::Scenario(_)));
}

#[test]
fn bundled_scenario_replays() {
    let raw = include_str!("../scenarios/rice_partial_delivery.json");
    let replay = run(&Scenario::from_json(raw).unwrap(), ReceivingPolicy::default()).unwrap();

    assert_eq!(replay.order().status(), PurchaseOrderStatus::PartiallyReceived);
    assert!(!replay.summary().receivable.is_closed());
}
