use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use std::collections::HashMap;
use tracing::info;

use crate::api::DbPool;
use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::schema::*;

/// Payments are recorded but not charged; no gateway is wired in.
pub const SIMULATED_PROVIDER: &str = "simulated";

/// Statuses in which an unassigned order is offered to every driver.
pub const OPEN_FOR_PICKUP: [OrderStatus; 2] = [OrderStatus::Accepted, OrderStatus::Preparing];

/// Whether `identity` may read `order`; mirrors the filters in `list_for`.
fn is_visible_to(order: &Order, identity: &Identity) -> bool {
    match identity.role {
        Role::Customer => order.customer_id == identity.id,
        Role::Restaurant => order.restaurant_id == identity.id,
        Role::Driver => match order.driver_id {
            Some(driver) => driver == identity.id,
            None => OPEN_FOR_PICKUP.iter().any(|s| s.as_str() == order.status),
        },
        Role::Other => false,
    }
}

pub struct OrderService {
    pool: DbPool,
}

impl OrderService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates one payment and one order per restaurant in the cart, atomically.
    pub async fn checkout(&self, customer_id: i32, lines: &[CartLine]) -> ApiResult<CheckoutReceipt> {
        let plan = plan_checkout(lines)?;
        let mut conn = self.pool.get().await?;

        let receipt = conn
            .transaction::<_, ApiError, _>(|conn| {
                Box::pin(async move {
                    let new_payment = NewPayment {
                        amount: plan.total.clone(),
                        status: PaymentStatus::Pending.as_str().to_string(),
                        provider: SIMULATED_PROVIDER.to_string(),
                    };
                    let payment = diesel::insert_into(payments::table)
                        .values(&new_payment)
                        .get_result::<Payment>(conn)
                        .await?;

                    let mut created = Vec::with_capacity(plan.orders.len());
                    for planned in &plan.orders {
                        let new_order = NewOrder {
                            customer_id,
                            restaurant_id: planned.restaurant_id,
                            status: OrderStatus::Pending.as_str().to_string(),
                            total_price: planned.total_price.clone(),
                            payment_id: payment.id,
                        };
                        let order = diesel::insert_into(orders::table)
                            .values(&new_order)
                            .get_result::<Order>(conn)
                            .await?;

                        let new_items: Vec<NewOrderItem> = planned
                            .items
                            .iter()
                            .map(|item| NewOrderItem {
                                order_id: order.id,
                                menu_item_id: item.menu_item_id,
                                quantity: item.quantity,
                                price: item.price.clone(),
                            })
                            .collect();
                        let items = diesel::insert_into(order_items::table)
                            .values(&new_items)
                            .get_results::<OrderItem>(conn)
                            .await?;

                        created.push(OrderDetails {
                            order,
                            items,
                            driver: None,
                        });
                    }

                    Ok(CheckoutReceipt {
                        payment,
                        orders: created,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                ApiError::Internal { source, .. } => {
                    ApiError::internal("failed to create order", source)
                }
                other => other,
            })?;

        info!(
            customer_id,
            payment_id = receipt.payment.id,
            orders = receipt.orders.len(),
            "Orders created from cart"
        );
        Ok(receipt)
    }

    /// Orders visible to the caller, newest first.
    ///
    /// Drivers see the orders assigned to them plus unassigned orders that a
    /// restaurant has already accepted.
    pub async fn list_for(&self, identity: &Identity) -> ApiResult<Vec<OrderDetails>> {
        let mut conn = self.pool.get().await?;

        let query = orders::table
            .order(orders::created_at.desc())
            .into_boxed::<diesel::pg::Pg>();
        let query = match identity.role {
            Role::Customer => query.filter(orders::customer_id.eq(identity.id)),
            Role::Restaurant => query.filter(orders::restaurant_id.eq(identity.id)),
            Role::Driver => query.filter(
                orders::driver_id.eq(identity.id).or(orders::driver_id.is_null().and(
                    orders::status.eq_any(OPEN_FOR_PICKUP.map(|s| s.as_str())),
                )),
            ),
            Role::Other => {
                return Err(ApiError::Forbidden(format!(
                    "role {} may not list orders",
                    identity.role
                )))
            }
        };

        let rows = query
            .select(Order::as_select())
            .load::<Order>(&mut conn)
            .await?;
        Ok(load_details(&mut conn, rows).await?)
    }

    pub async fn get_for(&self, identity: &Identity, order_id: i32) -> ApiResult<OrderDetails> {
        let mut conn = self.pool.get().await?;

        let order = find_order(&mut conn, order_id).await?;
        if !is_visible_to(&order, identity) {
            return Err(ApiError::Forbidden(format!(
                "order {} does not belong to the caller",
                order_id
            )));
        }

        let mut details = load_details(&mut conn, vec![order]).await?;
        details
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("order {} not found", order_id)))
    }

    /// Applies a status change requested by `actor`.
    ///
    /// The driver column is only ever written for driver callers, and a
    /// `Delivered` status queues a delivery notification when the customer
    /// asked for one.
    pub async fn transition(
        &self,
        order_id: i32,
        actor: Actor,
        status: &str,
        driver_id: Option<i32>,
    ) -> ApiResult<OrderDetails> {
        let target: OrderStatus = status
            .parse()
            .map_err(|e: UnknownStatus| ApiError::Validation(e.to_string()))?;
        let mut conn = self.pool.get().await?;

        let details = conn
            .transaction::<_, ApiError, _>(|conn| {
                Box::pin(async move {
                    let order = orders::table
                        .find(order_id)
                        .select(Order::as_select())
                        .for_update()
                        .first::<Order>(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| ApiError::NotFound(format!("order {} not found", order_id)))?;

                    let assignment = authorize_transition(&order.parties(), &actor, target, driver_id)?;

                    let update = diesel::update(orders::table.find(order_id));
                    let now = Utc::now();
                    let updated = match assignment {
                        DriverAssignment::Assign(driver) => {
                            update
                                .set((
                                    orders::status.eq(target.as_str()),
                                    orders::driver_id.eq(Some(driver)),
                                    orders::updated_at.eq(now),
                                ))
                                .get_result::<Order>(conn)
                                .await?
                        }
                        DriverAssignment::Unchanged => {
                            update
                                .set((orders::status.eq(target.as_str()), orders::updated_at.eq(now)))
                                .get_result::<Order>(conn)
                                .await?
                        }
                    };

                    if target == OrderStatus::Delivered {
                        queue_delivery_notification(conn, &updated).await?;
                    }

                    let mut details = load_details(conn, vec![updated]).await?;
                    details
                        .pop()
                        .ok_or_else(|| ApiError::NotFound(format!("order {} not found", order_id)))
                })
            })
            .await?;

        info!(
            order_id,
            status = %target,
            role = %actor.role,
            actor_id = actor.id,
            "Order status updated"
        );
        Ok(details)
    }
}

async fn find_order(conn: &mut AsyncPgConnection, order_id: i32) -> ApiResult<Order> {
    orders::table
        .find(order_id)
        .select(Order::as_select())
        .first::<Order>(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("order {} not found", order_id)))
}

/// Attaches items and assigned drivers to a set of orders, keeping their order.
async fn load_details(
    conn: &mut AsyncPgConnection,
    rows: Vec<Order>,
) -> QueryResult<Vec<OrderDetails>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let items = OrderItem::belonging_to(&rows)
        .select(OrderItem::as_select())
        .order(order_items::id.asc())
        .load::<OrderItem>(conn)
        .await?;
    let items_by_order = items.grouped_by(&rows);

    let driver_ids: Vec<i32> = rows.iter().filter_map(|o| o.driver_id).collect();
    let drivers_by_id: HashMap<i32, Driver> = if driver_ids.is_empty() {
        HashMap::new()
    } else {
        drivers::table
            .filter(drivers::id.eq_any(&driver_ids))
            .select(Driver::as_select())
            .load::<Driver>(conn)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect()
    };

    Ok(rows
        .into_iter()
        .zip(items_by_order)
        .map(|(order, items)| {
            let driver = order
                .driver_id
                .and_then(|id| drivers_by_id.get(&id).cloned());
            OrderDetails {
                order,
                items,
                driver,
            }
        })
        .collect())
}

async fn queue_delivery_notification(conn: &mut AsyncPgConnection, order: &Order) -> QueryResult<()> {
    let wants_notice = notification_settings::table
        .filter(notification_settings::customer_id.eq(order.customer_id))
        .select(notification_settings::food_delivered)
        .first::<bool>(conn)
        .await
        .optional()?
        .unwrap_or(false);

    if !wants_notice {
        return Ok(());
    }

    let notification = NewNotification {
        kind: NotificationKind::FoodDelivered.as_str().to_string(),
        message: format!("Your order #{} has been delivered.", order.id),
        customer_id: Some(order.customer_id),
    };
    diesel::insert_into(notifications::table)
        .values(&notification)
        .execute(conn)
        .await?;
    Ok(())
}
