use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::{NotificationFlags, NotificationPreference};
use std::sync::Arc;
use tracing::info;

use crate::api::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::messaging::{BroadcastTopic, SubscriptionState};
use crate::models::{NewNotificationSetting, NotificationSetting};
use crate::schema::{customers, notification_settings};

pub struct PreferenceService {
    pool: DbPool,
    topic: Arc<dyn BroadcastTopic>,
}

impl PreferenceService {
    pub fn new(pool: DbPool, topic: Arc<dyn BroadcastTopic>) -> Self {
        Self { pool, topic }
    }

    pub async fn flags(&self, customer_id: i32) -> ApiResult<NotificationFlags> {
        let mut conn = self.pool.get().await?;
        let setting = notification_settings::table
            .filter(notification_settings::customer_id.eq(customer_id))
            .select(NotificationSetting::as_select())
            .first::<NotificationSetting>(&mut conn)
            .await
            .optional()?;
        Ok(setting.map(|s| s.flags()).unwrap_or_default())
    }

    /// Turns one preference on or off, creating the settings row on first use.
    ///
    /// The topic subscription for `subscribeApp` is changed inside the same
    /// transaction, so a refused unsubscribe leaves the stored flag untouched.
    pub async fn toggle(
        &self,
        customer_id: i32,
        preference: NotificationPreference,
        enabled: bool,
    ) -> ApiResult<NotificationSetting> {
        let topic = self.topic.clone();
        let mut conn = self.pool.get().await?;

        let setting = conn
            .transaction::<_, ApiError, _>(|conn| {
                Box::pin(async move {
                    let email = customers::table
                        .find(customer_id)
                        .select(customers::email)
                        .first::<String>(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| {
                            ApiError::NotFound(format!("customer {} not found", customer_id))
                        })?;

                    let current = load_or_create(conn, customer_id).await?;
                    let mut flags = current.flags();
                    flags.set(preference, enabled);

                    let updated = diesel::update(notification_settings::table.find(current.id))
                        .set((
                            notification_settings::food_delivered.eq(flags.food_delivered),
                            notification_settings::new_menu_item_in_favorite_rest
                                .eq(flags.new_menu_item_in_favorite_rest),
                            notification_settings::subscribe_app.eq(flags.subscribe_app),
                        ))
                        .get_result::<NotificationSetting>(conn)
                        .await?;

                    if preference == NotificationPreference::SubscribeApp {
                        sync_topic_subscription(topic.as_ref(), &email, enabled).await?;
                    }

                    Ok(updated)
                })
            })
            .await?;

        info!(customer_id, preference = %preference, enabled, "Notification preference updated");
        Ok(setting)
    }
}

async fn load_or_create(
    conn: &mut AsyncPgConnection,
    customer_id: i32,
) -> QueryResult<NotificationSetting> {
    diesel::insert_into(notification_settings::table)
        .values(&NewNotificationSetting { customer_id })
        .on_conflict(notification_settings::customer_id)
        .do_nothing()
        .execute(conn)
        .await?;

    notification_settings::table
        .filter(notification_settings::customer_id.eq(customer_id))
        .select(NotificationSetting::as_select())
        .first::<NotificationSetting>(conn)
        .await
}

/// Subscribes or unsubscribes `email` on the broadcast topic.
///
/// A subscription still waiting for its email confirmation cannot be removed;
/// the customer has to confirm it first.
pub async fn sync_topic_subscription(
    topic: &dyn BroadcastTopic,
    email: &str,
    enabled: bool,
) -> ApiResult<()> {
    if enabled {
        return topic
            .subscribe_email(email)
            .await
            .map_err(|e| ApiError::internal("failed to subscribe to topic", e));
    }

    let existing = topic
        .find_email_subscription(email)
        .await
        .map_err(|e| ApiError::internal("failed to look up topic subscription", e))?;

    match existing.map(|sub| sub.state) {
        None => Ok(()),
        Some(SubscriptionState::PendingConfirmation) => Err(ApiError::Conflict(
            "subscription is pending confirmation; confirm it from the email link before unsubscribing"
                .to_string(),
        )),
        Some(SubscriptionState::Confirmed { subscription_arn }) => topic
            .unsubscribe(&subscription_arn)
            .await
            .map_err(|e| ApiError::internal("failed to unsubscribe from topic", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory::MemoryTopic;

    const EMAIL: &str = "ana@example.com";

    #[tokio::test]
    async fn test_enable_subscribes_email() {
        let topic = MemoryTopic::default();
        sync_topic_subscription(&topic, EMAIL, true).await.unwrap();

        let subs = topic.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].endpoint, EMAIL);
    }

    #[tokio::test]
    async fn test_disable_pending_subscription_conflicts() {
        let topic = MemoryTopic::default();
        topic.subscribe_email(EMAIL).await.unwrap();

        let err = sync_topic_subscription(&topic, EMAIL, false).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(
            topic.subscriptions()[0].state,
            SubscriptionState::PendingConfirmation
        );
    }

    #[tokio::test]
    async fn test_disable_confirmed_subscription_removes_it() {
        let topic = MemoryTopic::default();
        topic.subscribe_email(EMAIL).await.unwrap();
        topic.confirm(EMAIL);

        sync_topic_subscription(&topic, EMAIL, false).await.unwrap();
        assert!(topic.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_disable_without_subscription_is_a_no_op() {
        let topic = MemoryTopic::default();
        sync_topic_subscription(&topic, EMAIL, false).await.unwrap();
        assert!(topic.subscriptions().is_empty());
    }
}
