use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::schema::{menu_item_ratings, restaurant_ratings};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemRatingInput {
    pub menu_item_id: i32,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantRatingInput {
    pub restaurant_id: i32,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// Keeps the last rating per menu item; one statement cannot upsert a key twice.
fn last_rating_per_item(customer_id: i32, inputs: Vec<MenuItemRatingInput>) -> Vec<NewMenuItemRating> {
    let mut rows: Vec<NewMenuItemRating> = Vec::with_capacity(inputs.len());
    for input in inputs {
        rows.retain(|row| row.menu_item_id != input.menu_item_id);
        rows.push(NewMenuItemRating {
            customer_id,
            menu_item_id: input.menu_item_id,
            rating: input.rating,
            comment: input.comment,
        });
    }
    rows
}

pub struct RatingService {
    pool: DbPool,
}

impl RatingService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_menu_item_ratings(
        &self,
        customer_id: i32,
        inputs: Vec<MenuItemRatingInput>,
    ) -> ApiResult<Vec<MenuItemRating>> {
        if inputs.is_empty() {
            return Err(ApiError::Validation("no ratings given".to_string()));
        }
        for input in &inputs {
            input.validate()?;
        }

        let rows = last_rating_per_item(customer_id, inputs);
        let mut conn = self.pool.get().await?;

        let stored = conn
            .transaction::<_, ApiError, _>(|conn| {
                Box::pin(async move {
                    let stored = diesel::insert_into(menu_item_ratings::table)
                        .values(&rows)
                        .on_conflict((menu_item_ratings::customer_id, menu_item_ratings::menu_item_id))
                        .do_update()
                        .set((
                            menu_item_ratings::rating.eq(excluded(menu_item_ratings::rating)),
                            menu_item_ratings::comment.eq(excluded(menu_item_ratings::comment)),
                        ))
                        .get_results::<MenuItemRating>(conn)
                        .await?;
                    Ok(stored)
                })
            })
            .await?;

        info!(customer_id, count = stored.len(), "Menu item ratings saved");
        Ok(stored)
    }

    pub async fn upsert_restaurant_rating(
        &self,
        customer_id: i32,
        input: RestaurantRatingInput,
    ) -> ApiResult<RestaurantRating> {
        input.validate()?;

        let row = NewRestaurantRating {
            customer_id,
            restaurant_id: input.restaurant_id,
            rating: input.rating,
            comment: input.comment,
        };
        let mut conn = self.pool.get().await?;

        let stored = conn
            .transaction::<_, ApiError, _>(|conn| {
                Box::pin(async move {
                    let stored = diesel::insert_into(restaurant_ratings::table)
                        .values(&row)
                        .on_conflict((
                            restaurant_ratings::customer_id,
                            restaurant_ratings::restaurant_id,
                        ))
                        .do_update()
                        .set((
                            restaurant_ratings::rating.eq(excluded(restaurant_ratings::rating)),
                            restaurant_ratings::comment.eq(excluded(restaurant_ratings::comment)),
                        ))
                        .get_result::<RestaurantRating>(conn)
                        .await?;
                    Ok(stored)
                })
            })
            .await?;

        info!(
            customer_id,
            restaurant_id = stored.restaurant_id,
            "Restaurant rating saved"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(menu_item_id: i32, rating: i32) -> MenuItemRatingInput {
        MenuItemRatingInput {
            menu_item_id,
            rating,
            comment: None,
        }
    }

    #[test]
    fn test_rating_range_is_validated() {
        assert!(input(1, 5).validate().is_ok());
        assert!(input(1, 0).validate().is_err());
        assert!(input(1, 6).validate().is_err());
    }

    #[test]
    fn test_long_comment_is_rejected() {
        let rating = RestaurantRatingInput {
            restaurant_id: 1,
            rating: 4,
            comment: Some("x".repeat(1001)),
        };
        assert!(rating.validate().is_err());
    }

    #[test]
    fn test_duplicate_items_keep_last_rating() {
        let rows = last_rating_per_item(9, vec![input(1, 2), input(2, 3), input(1, 5)]);
        let pairs: Vec<(i32, i32)> = rows.iter().map(|r| (r.menu_item_id, r.rating)).collect();
        assert_eq!(pairs, vec![(2, 3), (1, 5)]);
        assert!(rows.iter().all(|r| r.customer_id == 9));
    }

    #[test]
    fn test_rating_body_from_json() {
        let raw = r#"[{"menuItemId":10,"rating":4,"comment":"Crispy"},{"menuItemId":11,"rating":2}]"#;
        let parsed: Vec<MenuItemRatingInput> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].comment.as_deref(), Some("Crispy"));
        assert_eq!(parsed[1].comment, None);
    }
}
