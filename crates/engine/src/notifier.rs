//! Outbound "bill closed" notification.
//!
//! The machine invokes this once per close, through the retry envelope in
//! [`crate::retry`]. From the engine's viewpoint the operation is
//! idempotent; exhausting retries is logged and never re-opens a bill.

use async_trait::async_trait;
use thiserror::Error;

use billflow_billing::Bill;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Side effect invoked with the finalized bill snapshot.
#[async_trait]
pub trait BillClosedNotifier: Send + Sync {
    async fn bill_closed(&self, bill: &Bill) -> Result<(), NotifyError>;
}

/// Production notifier: renders the customer email and hands it to the
/// delivery channel (currently the log - the transport is external).
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailNotifier;

#[async_trait]
impl BillClosedNotifier for EmailNotifier {
    async fn bill_closed(&self, bill: &Bill) -> Result<(), NotifyError> {
        let message = render_email(bill);

        tracing::info!(
            bill_id = %bill.id_typed(),
            customer_id = %bill.customer_id(),
            total = %bill.total(),
            message,
            "sending bill closed email notification"
        );

        Ok(())
    }
}

fn render_email(bill: &Bill) -> String {
    let closed_on = bill
        .closed_at()
        .map(|t| t.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "an unknown date".to_string());

    let mut message = format!(
        "\nDear Customer #{},\n\nYour bill #{} has been closed on {}.\n\nTotal: {}\n",
        bill.customer_id(),
        bill.id_typed(),
        closed_on,
        bill.total()
    );

    for (idx, item) in bill.line_items().iter().enumerate() {
        message.push_str(&format!(
            "\nLine Item #{}:\nAmount: {}\nCurrency: {}\nCreated At: {}\n",
            idx + 1,
            item.amount,
            item.amount.currency(),
            item.created_at.format("%B %-d, %Y")
        ));
    }

    message
}
