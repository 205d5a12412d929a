use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts. A receipt that has been recorded is never
/// edited; later corrections arrive as further events.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "purchasing.order.goods_received").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
