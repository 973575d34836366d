pub mod audit_logs;
pub mod outbox_messages;
pub mod payments;
pub mod subscriptions;
pub mod webhook_events;

/// Subscription status values stored in `Subscriptions.Status` that this
/// crate reads or writes.
pub mod subscription_status {
    pub const ACTIVE: &str = "Active";
    pub const EXPIRED: &str = "Expired";
}
