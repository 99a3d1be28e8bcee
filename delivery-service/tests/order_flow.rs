//! Database-backed checks of checkout and status transitions.

mod common;

use bigdecimal::BigDecimal;
use common::{dec, insert_customer, pool, unique};
use delivery_service::api::DbPool;
use delivery_service::error::ApiError;
use delivery_service::orders::OrderService;
use delivery_service::schema::*;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::{Actor, CartLine, OrderStatus, Role};

struct Fixture {
    customer: i32,
    restaurants: [i32; 2],
    menu_items: [i32; 2],
    drivers: [i32; 2],
}

async fn seed(pool: &DbPool) -> Fixture {
    let (customer, _) = insert_customer(pool).await;
    let mut conn = pool.get().await.unwrap();

    let mut restaurant_ids = [0; 2];
    let mut menu_item_ids = [0; 2];
    for i in 0..2 {
        restaurant_ids[i] = diesel::insert_into(restaurants::table)
            .values((restaurants::name.eq("Kitchen"), restaurants::email.eq(unique("restaurant"))))
            .returning(restaurants::id)
            .get_result::<i32>(&mut conn)
            .await
            .unwrap();
        menu_item_ids[i] = diesel::insert_into(menu_items::table)
            .values((
                menu_items::restaurant_id.eq(restaurant_ids[i]),
                menu_items::name.eq("Dish"),
                menu_items::price.eq(dec("5")),
            ))
            .returning(menu_items::id)
            .get_result::<i32>(&mut conn)
            .await
            .unwrap();
    }

    let mut driver_ids = [0; 2];
    for slot in driver_ids.iter_mut() {
        *slot = diesel::insert_into(drivers::table)
            .values((drivers::name.eq("Bo"), drivers::email.eq(unique("driver"))))
            .returning(drivers::id)
            .get_result::<i32>(&mut conn)
            .await
            .unwrap();
    }

    Fixture {
        customer,
        restaurants: restaurant_ids,
        menu_items: menu_item_ids,
        drivers: driver_ids,
    }
}

fn line(restaurant_id: i32, menu_item_id: i32, price: &str, quantity: i32) -> CartLine {
    CartLine {
        restaurant_id,
        menu_item_id,
        price: dec(price),
        quantity,
    }
}

async fn stored_status(pool: &DbPool, order_id: i32) -> String {
    let mut conn = pool.get().await.unwrap();
    orders::table
        .find(order_id)
        .select(orders::status)
        .first::<String>(&mut conn)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_checkout_splits_cart_per_restaurant() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;

    let receipt = OrderService::new(pool.clone())
        .checkout(
            f.customer,
            &[
                line(f.restaurants[0], f.menu_items[0], "5", 2),
                line(f.restaurants[1], f.menu_items[1], "3", 1),
            ],
        )
        .await
        .unwrap();

    assert_eq!(receipt.payment.amount, dec("13"));
    assert_eq!(receipt.payment.status, "Pending");
    assert_eq!(receipt.orders.len(), 2);

    let first = &receipt.orders[0];
    assert_eq!(first.order.restaurant_id, f.restaurants[0]);
    assert_eq!(first.order.total_price, dec("10"));
    assert_eq!(first.order.payment_id, receipt.payment.id);
    assert_eq!(first.items.len(), 1);

    let second = &receipt.orders[1];
    assert_eq!(second.order.restaurant_id, f.restaurants[1]);
    assert_eq!(second.order.total_price, dec("3"));
    assert!(receipt.orders.iter().all(|o| o.order.status == "Pending"));
}

#[tokio::test]
async fn test_failed_item_insert_leaves_nothing_behind() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;

    let err = OrderService::new(pool.clone())
        .checkout(
            f.customer,
            &[
                line(f.restaurants[0], f.menu_items[0], "777.77", 1),
                line(f.restaurants[1], -1, "1", 1),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Internal { .. }));

    let mut conn = pool.get().await.unwrap();
    let orders_left = orders::table
        .filter(orders::customer_id.eq(f.customer))
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .unwrap();
    assert_eq!(orders_left, 0);

    let payments_left = payments::table
        .filter(payments::amount.eq(dec("778.77")))
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .unwrap();
    assert_eq!(payments_left, 0);
}

#[tokio::test]
async fn test_stored_order_totals_match_their_items() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;

    let receipt = OrderService::new(pool.clone())
        .checkout(
            f.customer,
            &[
                line(f.restaurants[0], f.menu_items[0], "9.99", 3),
                line(f.restaurants[0], f.menu_items[0], "0.01", 7),
                line(f.restaurants[1], f.menu_items[1], "12.40", 1),
            ],
        )
        .await
        .unwrap();

    let mut conn = pool.get().await.unwrap();
    let mut payment_total = dec("0");
    for created in &receipt.orders {
        let rows = order_items::table
            .filter(order_items::order_id.eq(created.order.id))
            .select((order_items::price, order_items::quantity))
            .load::<(BigDecimal, i32)>(&mut conn)
            .await
            .unwrap();
        let item_sum = rows
            .iter()
            .fold(dec("0"), |acc, (price, qty)| acc + price * BigDecimal::from(*qty));
        let stored_total = orders::table
            .find(created.order.id)
            .select(orders::total_price)
            .first::<BigDecimal>(&mut conn)
            .await
            .unwrap();
        assert_eq!(item_sum, stored_total);
        payment_total += stored_total;
    }
    assert_eq!(payment_total, receipt.payment.amount);
    assert_eq!(receipt.payment.amount, dec("42.44"));
}

#[tokio::test]
async fn test_sub_cent_price_is_rejected_before_writing() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;

    let err = OrderService::new(pool.clone())
        .checkout(f.customer, &[line(f.restaurants[0], f.menu_items[0], "0.005", 3)])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let mut conn = pool.get().await.unwrap();
    let orders_left = orders::table
        .filter(orders::customer_id.eq(f.customer))
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .unwrap();
    assert_eq!(orders_left, 0);
}

#[tokio::test]
async fn test_transitions_follow_role_table() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;
    let service = OrderService::new(pool.clone());

    let receipt = service
        .checkout(f.customer, &[line(f.restaurants[0], f.menu_items[0], "5", 1)])
        .await
        .unwrap();
    let order_id = receipt.orders[0].order.id;

    let customer = Actor {
        id: f.customer,
        role: Role::Customer,
    };
    let err = service
        .transition(order_id, customer, "Preparing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(stored_status(&pool, order_id).await, "Pending");

    let restaurant = Actor {
        id: f.restaurants[0],
        role: Role::Restaurant,
    };
    let err = service
        .transition(order_id, restaurant, "Accepted", Some(f.drivers[0]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(stored_status(&pool, order_id).await, "Pending");

    let accepted = service
        .transition(order_id, restaurant, "Accepted", None)
        .await
        .unwrap();
    assert_eq!(accepted.order.status, OrderStatus::Accepted.as_str());
    assert_eq!(accepted.order.driver_id, None);

    let driver = Actor {
        id: f.drivers[0],
        role: Role::Driver,
    };
    let picked = service
        .transition(order_id, driver, "PickedUp", Some(f.drivers[0]))
        .await
        .unwrap();
    assert_eq!(picked.order.driver_id, Some(f.drivers[0]));
    assert_eq!(picked.driver.as_ref().map(|d| d.id), Some(f.drivers[0]));
    assert_eq!(picked.items.len(), 1);

    let other_driver = Actor {
        id: f.drivers[1],
        role: Role::Driver,
    };
    let err = service
        .transition(order_id, other_driver, "Delivered", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    assert_eq!(stored_status(&pool, order_id).await, "PickedUp");
}

#[tokio::test]
async fn test_delivery_queues_notification_when_enabled() {
    let Some(pool) = pool().await else { return };
    let f = seed(&pool).await;
    let service = OrderService::new(pool.clone());

    {
        let mut conn = pool.get().await.unwrap();
        diesel::insert_into(notification_settings::table)
            .values((
                notification_settings::customer_id.eq(f.customer),
                notification_settings::food_delivered.eq(true),
            ))
            .execute(&mut conn)
            .await
            .unwrap();
    }

    let receipt = service
        .checkout(f.customer, &[line(f.restaurants[0], f.menu_items[0], "5", 1)])
        .await
        .unwrap();
    let order_id = receipt.orders[0].order.id;
    let driver = Actor {
        id: f.drivers[0],
        role: Role::Driver,
    };
    service
        .transition(order_id, driver, "Delivered", None)
        .await
        .unwrap();

    let mut conn = pool.get().await.unwrap();
    let kinds = notifications::table
        .filter(notifications::customer_id.eq(f.customer))
        .select(notifications::kind)
        .load::<String>(&mut conn)
        .await
        .unwrap();
    assert_eq!(kinds, vec!["FoodDelivered".to_string()]);
}

#[tokio::test]
async fn test_missing_order_is_not_found() {
    let Some(pool) = pool().await else { return };
    let customer = Actor {
        id: 1,
        role: Role::Customer,
    };
    let err = OrderService::new(pool)
        .transition(i32::MAX, customer, "Cancelled", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
