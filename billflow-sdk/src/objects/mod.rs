pub mod webhook;

pub use webhook::{
    DEFAULT_PAYMENT_STATUS, PAYMENT_REFUNDED, PAYMENT_SUCCEEDED, PaymentWebhookEnvelope,
    WebhookAck,
};
