use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use shared::*;
use std::sync::Arc;

use crate::auth::{auth_middleware, Identity};
use crate::error::{ApiError, ApiResult};
use crate::messaging::BroadcastTopic;
use crate::models::*;
use crate::orders::OrderService;
use crate::preferences::PreferenceService;
use crate::ratings::{MenuItemRatingInput, RatingService, RestaurantRatingInput};

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub topic: Arc<dyn BroadcastTopic>,
    pub jwt_secret: Arc<str>,
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/order", post(create_order).get(list_orders))
        .route("/order/:order_id", get(get_order).put(update_order))
        .route("/notificationSetting/:customer_id", get(get_notification_settings))
        .route(
            "/notificationSetting/:customer_id/:preference/on",
            post(enable_notification),
        )
        .route(
            "/notificationSetting/:customer_id/:preference/off",
            post(disable_notification),
        )
        .route("/menuItemRating/:customer_id", post(rate_menu_items))
        .route("/restaurantRating/:customer_id", post(rate_restaurant))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order(
    State(state): State<AppState>,
    identity: Identity,
    body: Result<Json<Vec<CartLine>>, JsonRejection>,
) -> ApiResult<Json<CheckoutReceipt>> {
    identity.require_role(Role::Customer)?;
    let Json(lines) = body?;

    let receipt = OrderService::new(state.pool)
        .checkout(identity.id, &lines)
        .await?;
    Ok(Json(receipt))
}

pub async fn list_orders(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<OrderDetails>>> {
    let orders = OrderService::new(state.pool).list_for(&identity).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<OrderDetails>> {
    let Path(order_id) = path?;
    let order = OrderService::new(state.pool)
        .get_for(&identity, order_id)
        .await?;
    Ok(Json(order))
}

pub async fn update_order(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> ApiResult<Json<OrderDetails>> {
    let Path(order_id) = path?;
    let Json(request) = body?;

    let order = OrderService::new(state.pool)
        .transition(order_id, identity.actor(), &request.status, request.driver_id)
        .await?;
    Ok(Json(order))
}

fn require_self(identity: &Identity, customer_id: i32) -> ApiResult<()> {
    identity.require_role(Role::Customer)?;
    if identity.id != customer_id {
        return Err(ApiError::Forbidden(
            "customers may only manage their own notification settings".to_string(),
        ));
    }
    Ok(())
}

pub async fn get_notification_settings(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<NotificationFlags>> {
    let Path(customer_id) = path?;
    require_self(&identity, customer_id)?;

    let flags = PreferenceService::new(state.pool, state.topic)
        .flags(customer_id)
        .await?;
    Ok(Json(flags))
}

async fn toggle_notification(
    state: AppState,
    identity: Identity,
    customer_id: i32,
    preference: &str,
    enabled: bool,
) -> ApiResult<Json<NotificationSetting>> {
    let preference: NotificationPreference = preference.parse()?;
    require_self(&identity, customer_id)?;

    let setting = PreferenceService::new(state.pool, state.topic)
        .toggle(customer_id, preference, enabled)
        .await?;
    Ok(Json(setting))
}

pub async fn enable_notification(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<(i32, String)>, PathRejection>,
) -> ApiResult<Json<NotificationSetting>> {
    let Path((customer_id, preference)) = path?;
    toggle_notification(state, identity, customer_id, &preference, true).await
}

pub async fn disable_notification(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<(i32, String)>, PathRejection>,
) -> ApiResult<Json<NotificationSetting>> {
    let Path((customer_id, preference)) = path?;
    toggle_notification(state, identity, customer_id, &preference, false).await
}

pub async fn rate_menu_items(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<Vec<MenuItemRatingInput>>, JsonRejection>,
) -> ApiResult<Json<Vec<MenuItemRating>>> {
    let Path(customer_id) = path?;
    let Json(ratings) = body?;

    let stored = RatingService::new(state.pool)
        .upsert_menu_item_ratings(customer_id, ratings)
        .await?;
    Ok(Json(stored))
}

pub async fn rate_restaurant(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<RestaurantRatingInput>, JsonRejection>,
) -> ApiResult<Json<RestaurantRating>> {
    let Path(customer_id) = path?;
    let Json(rating) = body?;

    let stored = RatingService::new(state.pool)
        .upsert_restaurant_rating(customer_id, rating)
        .await?;
    Ok(Json(stored))
}

pub async fn health_check() -> &'static str {
    "OK"
}
