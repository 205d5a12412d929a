//! Receiving and purchasing failures.
//!
//! Every variant is an expected, recoverable input-validation outcome. None of
//! them leave partial state behind: validation always runs before mutation.

use thiserror::Error;

use supplyerp_core::DomainError;

/// Failure of the reconciliation engine (receipts and quality disposition).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReceivingError {
    /// The event would receive more than is outstanding and no manual
    /// completion was requested.
    #[error("line {line_no}: receiving {received} exceeds the outstanding {outstanding}")]
    OverReceipt {
        line_no: u32,
        received: f64,
        outstanding: f64,
    },

    /// The receipt receives nothing and completes nothing.
    #[error("receipt receives nothing and completes nothing")]
    EmptyReceipt,

    /// accepted + rejected + damaged exceeds the received quantity.
    #[error(
        "line {line_no}: accepted {accepted} + rejected {rejected} + damaged {damaged} exceeds received {received}"
    )]
    DispositionOverflow {
        line_no: u32,
        accepted: f64,
        rejected: f64,
        damaged: f64,
        received: f64,
    },

    /// A quantity or weight is negative (or not a finite number).
    #[error("line {line_no}: {field} must be a non-negative number, got {value}")]
    NegativeQuantity {
        line_no: u32,
        field: &'static str,
        value: f64,
    },

    /// A receipt entry references a line that is not on the order.
    #[error("line {line_no} is not on this purchase order")]
    UnknownLineItem { line_no: u32 },

    /// The same line is referenced twice in one receipt.
    #[error("line {line_no} appears more than once in the same receipt")]
    DuplicateLineItem { line_no: u32 },

    #[error("invalid receiving policy: {0}")]
    InvalidPolicy(String),
}

/// Error type of the purchase-order aggregate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PurchasingError {
    #[error(transparent)]
    Receiving(#[from] ReceivingError),

    /// No line on the order is receivable any more.
    #[error("purchase order is already closed for receiving")]
    AlreadyClosed,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<ReceivingError> for DomainError {
    fn from(value: ReceivingError) -> Self {
        DomainError::validation(value.to_string())
    }
}

impl From<PurchasingError> for DomainError {
    fn from(value: PurchasingError) -> Self {
        match value {
            PurchasingError::Receiving(err) => err.into(),
            PurchasingError::AlreadyClosed => {
                DomainError::invariant("purchase order is already closed for receiving")
            }
            PurchasingError::Domain(err) => err,
        }
    }
}

/// Reject negative and non-finite figures.
pub(crate) fn ensure_non_negative(
    line_no: u32,
    field: &'static str,
    value: f64,
) -> Result<(), ReceivingError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ReceivingError::NegativeQuantity {
            line_no,
            field,
            value,
        })
    }
}
