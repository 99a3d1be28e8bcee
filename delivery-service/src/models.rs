use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::drivers)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::payments)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i32,
    pub amount: BigDecimal,
    pub status: String,
    pub provider: String,
    pub method_token: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment {
    pub amount: BigDecimal,
    pub status: String,
    pub provider: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::orders)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i32,
    pub customer_id: i32,
    pub restaurant_id: i32,
    pub driver_id: Option<i32>,
    pub status: String,
    pub total_price: BigDecimal,
    pub payment_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn parties(&self) -> OrderParties {
        OrderParties {
            customer_id: self.customer_id,
            restaurant_id: self.restaurant_id,
            driver_id: self.driver_id,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub customer_id: i32,
    pub restaurant_id: i32,
    pub status: String,
    pub total_price: BigDecimal,
    pub payment_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(Order))]
#[diesel(table_name = crate::schema::order_items)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i32,
    pub order_id: i32,
    pub menu_item_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub order_id: i32,
    pub menu_item_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// An order as returned to clients: the row plus its items and driver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub driver: Option<Driver>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub payment: Payment,
    pub orders: Vec<OrderDetails>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::notification_settings)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSetting {
    pub id: i32,
    pub customer_id: i32,
    pub food_delivered: bool,
    pub new_menu_item_in_favorite_rest: bool,
    pub subscribe_app: bool,
}

impl NotificationSetting {
    pub fn flags(&self) -> NotificationFlags {
        NotificationFlags {
            food_delivered: self.food_delivered,
            new_menu_item_in_favorite_rest: self.new_menu_item_in_favorite_rest,
            subscribe_app: self.subscribe_app,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notification_settings)]
pub struct NewNotificationSetting {
    pub customer_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct Notification {
    pub id: i32,
    pub kind: String,
    pub message: String,
    pub customer_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl TryFrom<Notification> for NotificationPayload {
    type Error = anyhow::Error;

    fn try_from(row: Notification) -> Result<Self, Self::Error> {
        let kind = serde_json::from_value(serde_json::Value::String(row.kind))?;
        Ok(Self {
            id: row.id,
            kind,
            message: row.message,
            customer_id: row.customer_id,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotification {
    pub kind: String,
    pub message: String,
    pub customer_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::menu_item_ratings)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemRating {
    pub id: i32,
    pub customer_id: i32,
    pub menu_item_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::menu_item_ratings)]
pub struct NewMenuItemRating {
    pub customer_id: i32,
    pub menu_item_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::restaurant_ratings)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantRating {
    pub id: i32,
    pub customer_id: i32,
    pub restaurant_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::restaurant_ratings)]
pub struct NewRestaurantRating {
    pub customer_id: i32,
    pub restaurant_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
}

/// Body of `PUT /order/:orderId`.
///
/// The status stays a string here so that unknown values surface as a
/// validation error instead of a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub status: String,
    #[serde(default)]
    pub driver_id: Option<i32>,
}
