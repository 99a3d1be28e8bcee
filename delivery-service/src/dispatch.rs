use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::{NotificationKind, NotificationPayload};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::DbPool;
use crate::messaging::{BroadcastTopic, Mailer};
use crate::schema::customers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait RecipientLookup: Send + Sync {
    async fn customer(&self, customer_id: i32) -> Result<Option<Recipient>>;
}

pub struct PgRecipients {
    pool: DbPool,
}

impl PgRecipients {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientLookup for PgRecipients {
    async fn customer(&self, customer_id: i32) -> Result<Option<Recipient>> {
        let mut conn = self.pool.get().await?;
        let row = customers::table
            .filter(customers::id.eq(customer_id))
            .select((customers::name, customers::email))
            .first::<(String, String)>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(|(name, email)| Recipient { name, email }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Broadcast,
    Emailed,
    NoRecipient,
}

/// Routes a notification to the broadcast topic or to one customer's inbox.
pub struct NotificationDispatcher {
    recipients: Arc<dyn RecipientLookup>,
    mailer: Arc<dyn Mailer>,
    topic: Arc<dyn BroadcastTopic>,
}

impl NotificationDispatcher {
    pub fn new(
        recipients: Arc<dyn RecipientLookup>,
        mailer: Arc<dyn Mailer>,
        topic: Arc<dyn BroadcastTopic>,
    ) -> Self {
        Self {
            recipients,
            mailer,
            topic,
        }
    }

    pub async fn dispatch(&self, notification: &NotificationPayload) -> Result<DispatchOutcome> {
        if notification.kind.is_broadcast() {
            self.topic
                .publish(notification.kind.email_subject(), &notification.message)
                .await?;
            info!(notification_id = notification.id, "Broadcast notification published");
            return Ok(DispatchOutcome::Broadcast);
        }

        let recipient = match notification.customer_id {
            Some(customer_id) => self.recipients.customer(customer_id).await?,
            None => None,
        };

        // Missing recipients are dropped without retry.
        let Some(recipient) = recipient else {
            debug!(
                notification_id = notification.id,
                customer_id = ?notification.customer_id,
                "No recipient for notification"
            );
            return Ok(DispatchOutcome::NoRecipient);
        };

        let body = render_email(notification.kind, &recipient.name, &notification.message);
        self.mailer
            .send(&recipient.email, notification.kind.email_subject(), &body)
            .await?;
        info!(notification_id = notification.id, "Notification emailed");
        Ok(DispatchOutcome::Emailed)
    }
}

fn render_email(kind: NotificationKind, name: &str, message: &str) -> String {
    let footer = match kind {
        NotificationKind::FoodDelivered => "Enjoy your meal!",
        NotificationKind::NewMenuItemInFavoriteRest => "Open the app to take a look.",
        NotificationKind::SubscribeApp => "",
    };
    format!("Hi {name},\n\n{message}\n\n{footer}\n\nYou can change your notification settings in the app at any time.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory::{MemoryMailer, MemoryTopic};
    use std::collections::HashMap;

    struct FixedRecipients(HashMap<i32, Recipient>);

    #[async_trait]
    impl RecipientLookup for FixedRecipients {
        async fn customer(&self, customer_id: i32) -> Result<Option<Recipient>> {
            Ok(self.0.get(&customer_id).cloned())
        }
    }

    fn dispatcher() -> (NotificationDispatcher, Arc<MemoryMailer>, Arc<MemoryTopic>) {
        let mut known = HashMap::new();
        known.insert(
            3,
            Recipient {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
            },
        );
        let mailer = Arc::new(MemoryMailer::default());
        let topic = Arc::new(MemoryTopic::default());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FixedRecipients(known)),
            mailer.clone(),
            topic.clone(),
        );
        (dispatcher, mailer, topic)
    }

    fn payload(kind: NotificationKind, customer_id: Option<i32>) -> NotificationPayload {
        NotificationPayload {
            id: 1,
            kind,
            message: "Order #5 has been delivered".to_string(),
            customer_id,
        }
    }

    #[tokio::test]
    async fn test_subscribe_app_goes_to_topic() {
        let (dispatcher, mailer, topic) = dispatcher();
        let outcome = dispatcher
            .dispatch(&payload(NotificationKind::SubscribeApp, Some(3)))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Broadcast);
        assert_eq!(topic.published().len(), 1);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_customer_notification_is_emailed() {
        let (dispatcher, mailer, topic) = dispatcher();
        let outcome = dispatcher
            .dispatch(&payload(NotificationKind::FoodDelivered, Some(3)))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Emailed);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ana@example.com");
        assert_eq!(sent[0].subject, "Your order has been delivered");
        assert!(sent[0].body.contains("Hi Ana"));
        assert!(sent[0].body.contains("Order #5 has been delivered"));
        assert!(topic.published().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_is_dropped() {
        let (dispatcher, mailer, _topic) = dispatcher();
        let outcome = dispatcher
            .dispatch(&payload(NotificationKind::NewMenuItemInFavoriteRest, Some(404)))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::NoRecipient);

        let outcome = dispatcher
            .dispatch(&payload(NotificationKind::FoodDelivered, None))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::NoRecipient);
        assert!(mailer.sent().is_empty());
    }
}
