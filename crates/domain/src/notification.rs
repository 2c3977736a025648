//! Order confirmation dispatch.
//!
//! Notifications are best-effort: they run after the order is committed,
//! never block the request and never roll anything back.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data needed to tell a customer their order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub email: String,
    pub name: String,
    pub total: Money,
}

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget dispatcher held by the order service.
pub trait Notifier: Send + Sync {
    /// Queues an order confirmation. Must return without waiting for delivery.
    fn order_placed(&self, confirmation: OrderConfirmation);
}

/// Transport that actually delivers a confirmation.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Mailer that writes confirmations to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            order_id = %confirmation.order_id,
            to = %confirmation.email,
            total = %confirmation.total,
            "order confirmation sent"
        );
        Ok(())
    }
}

/// Runs each delivery on its own tokio task.
///
/// Failures are counted in `notifications_failed_total` and logged; they
/// are not retried.
pub struct BackgroundNotifier<M: Mailer> {
    mailer: Arc<M>,
}

impl<M: Mailer> BackgroundNotifier<M> {
    pub fn new(mailer: M) -> Self {
        Self {
            mailer: Arc::new(mailer),
        }
    }
}

impl<M: Mailer> Notifier for BackgroundNotifier<M> {
    fn order_placed(&self, confirmation: OrderConfirmation) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            if let Err(e) = mailer.send_order_confirmation(&confirmation).await {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(
                    order_id = %confirmation.order_id,
                    error = %e,
                    "order confirmation failed"
                );
            }
        });
    }
}

/// Synchronous notifier that keeps every confirmation, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<OrderConfirmation>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the confirmations dispatched so far.
    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.sent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn order_placed(&self, confirmation: OrderConfirmation) {
        self.sent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(confirmation);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    struct ChannelMailer {
        tx: mpsc::UnboundedSender<OrderId>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for ChannelMailer {
        async fn send_order_confirmation(
            &self,
            confirmation: &OrderConfirmation,
        ) -> Result<(), NotificationError> {
            let _ = self.tx.send(confirmation.order_id);
            if self.fail {
                Err(NotificationError::Delivery("smtp unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn confirmation() -> OrderConfirmation {
        OrderConfirmation {
            order_id: OrderId::new(9),
            email: "buyer@example.com".to_string(),
            name: "Buyer".to_string(),
            total: Money::from_cents(1500),
        }
    }

    #[tokio::test]
    async fn background_notifier_delivers_on_a_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = BackgroundNotifier::new(ChannelMailer { tx, fail: false });

        notifier.order_placed(confirmation());

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(delivered, Some(OrderId::new(9)));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = BackgroundNotifier::new(ChannelMailer { tx, fail: true });

        notifier.order_placed(confirmation());

        let attempted = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(attempted, Some(OrderId::new(9)));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send_order_confirmation(&confirmation()).await.is_ok());
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.order_placed(confirmation());
        notifier.order_placed(OrderConfirmation {
            order_id: OrderId::new(10),
            ..confirmation()
        });

        let ids: Vec<_> = notifier.sent().iter().map(|c| c.order_id).collect();
        assert_eq!(ids, vec![OrderId::new(9), OrderId::new(10)]);
    }
}
