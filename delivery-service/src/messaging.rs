//! Outbound messaging: transactional email and the broadcast topic.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sns::Client as SnsClient;

/// SNS reports unconfirmed subscriptions with this placeholder instead of an ARN.
const PENDING_CONFIRMATION: &str = "PendingConfirmation";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    PendingConfirmation,
    Confirmed { subscription_arn: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscription {
    pub endpoint: String,
    pub state: SubscriptionState,
}

/// A fan-out topic that customers subscribe to by email.
#[async_trait]
pub trait BroadcastTopic: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<()>;

    async fn subscribe_email(&self, email: &str) -> Result<()>;

    async fn find_email_subscription(&self, email: &str) -> Result<Option<TopicSubscription>>;

    async fn unsubscribe(&self, subscription_arn: &str) -> Result<()>;
}

pub struct SesMailer {
    client: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(client: SesClient, from: String) -> Self {
        Self { client, from }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let subject = Content::builder().data(subject).build()?;
        let body = Body::builder()
            .text(Content::builder().data(body).build()?)
            .build();
        let message = Message::builder().subject(subject).body(body).build();

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;

        tracing::info!(to = to, "Notification email sent");
        Ok(())
    }
}

pub struct SnsTopic {
    client: SnsClient,
    topic_arn: String,
}

impl SnsTopic {
    pub fn new(client: SnsClient, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[async_trait]
impl BroadcastTopic for SnsTopic {
    async fn publish(&self, subject: &str, message: &str) -> Result<()> {
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await?;

        tracing::info!(topic = %self.topic_arn, "Broadcast published");
        Ok(())
    }

    async fn subscribe_email(&self, email: &str) -> Result<()> {
        self.client
            .subscribe()
            .topic_arn(&self.topic_arn)
            .protocol("email")
            .endpoint(email)
            .send()
            .await?;

        tracing::info!(email = email, "Topic subscription requested");
        Ok(())
    }

    async fn find_email_subscription(&self, email: &str) -> Result<Option<TopicSubscription>> {
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_subscriptions_by_topic()
                .topic_arn(&self.topic_arn)
                .set_next_token(next_token.take())
                .send()
                .await?;

            let found = page
                .subscriptions()
                .iter()
                .find(|sub| sub.endpoint() == Some(email));

            if let Some(sub) = found {
                let state = match sub.subscription_arn() {
                    Some(arn) if arn != PENDING_CONFIRMATION => SubscriptionState::Confirmed {
                        subscription_arn: arn.to_string(),
                    },
                    _ => SubscriptionState::PendingConfirmation,
                };
                return Ok(Some(TopicSubscription {
                    endpoint: email.to_string(),
                    state,
                }));
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> Result<()> {
        self.client
            .unsubscribe()
            .subscription_arn(subscription_arn)
            .send()
            .await?;

        tracing::info!(subscription = subscription_arn, "Topic subscription removed");
        Ok(())
    }
}

/// Process-local messaging for development and tests.
///
/// Nothing leaves the process; sent mail and published messages are kept in
/// memory and logged. New subscriptions start out pending, like SNS email
/// subscriptions, until [`MemoryTopic::confirm`] is called.
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMail {
        pub to: String,
        pub subject: String,
        pub body: String,
    }

    #[derive(Default)]
    pub struct MemoryMailer {
        sent: Mutex<Vec<SentMail>>,
    }

    impl MemoryMailer {
        pub fn sent(&self) -> Vec<SentMail> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl Mailer for MemoryMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            tracing::info!(to = to, subject = subject, "Email kept in memory");
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(SentMail {
                    to: to.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                });
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryTopic {
        published: Mutex<Vec<(String, String)>>,
        subscriptions: Mutex<Vec<TopicSubscription>>,
    }

    impl MemoryTopic {
        pub fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn subscriptions(&self) -> Vec<TopicSubscription> {
            self.subscriptions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        /// Marks the email's subscription as confirmed, as the emailed link would.
        pub fn confirm(&self, email: &str) {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            for sub in subs.iter_mut().filter(|s| s.endpoint == email) {
                sub.state = SubscriptionState::Confirmed {
                    subscription_arn: format!("memory:{}", email),
                };
            }
        }
    }

    #[async_trait]
    impl BroadcastTopic for MemoryTopic {
        async fn publish(&self, subject: &str, message: &str) -> Result<()> {
            tracing::info!(subject = subject, "Broadcast kept in memory");
            self.published
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((subject.to_string(), message.to_string()));
            Ok(())
        }

        async fn subscribe_email(&self, email: &str) -> Result<()> {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            if !subs.iter().any(|s| s.endpoint == email) {
                subs.push(TopicSubscription {
                    endpoint: email.to_string(),
                    state: SubscriptionState::PendingConfirmation,
                });
            }
            Ok(())
        }

        async fn find_email_subscription(&self, email: &str) -> Result<Option<TopicSubscription>> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|s| s.endpoint == email)
                .cloned())
        }

        async fn unsubscribe(&self, subscription_arn: &str) -> Result<()> {
            self.subscriptions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|s| {
                    !matches!(&s.state, SubscriptionState::Confirmed { subscription_arn: arn } if arn == subscription_arn)
                });
            Ok(())
        }
    }
}
