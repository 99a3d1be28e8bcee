use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Money columns store two decimal places.
pub const PRICE_SCALE: i64 = 2;

/// One line of a customer's cart as submitted at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub restaurant_id: i32,
    pub menu_item_id: i32,
    pub price: BigDecimal,
    pub quantity: i32,
}

impl CartLine {
    pub fn subtotal(&self) -> BigDecimal {
        &self.price * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedItem {
    pub menu_item_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// Everything a single restaurant receives from one checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub restaurant_id: i32,
    pub total_price: BigDecimal,
    pub items: Vec<PlannedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPlan {
    pub total: BigDecimal,
    pub orders: Vec<PlannedOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,

    #[error("cart line {line}: quantity must be positive, got {quantity}")]
    InvalidQuantity { line: usize, quantity: i32 },

    #[error("cart line {line}: price must not be negative")]
    NegativePrice { line: usize },

    #[error("cart line {line}: price may have at most 2 decimal places")]
    PriceTooPrecise { line: usize },
}

/// Splits a flat cart into one planned order per restaurant.
///
/// Restaurants keep the order in which they first appear in the cart, and
/// items keep their relative order within a restaurant.
pub fn plan_checkout(lines: &[CartLine]) -> Result<CheckoutPlan, CartError> {
    if lines.is_empty() {
        return Err(CartError::Empty);
    }

    let zero = BigDecimal::from(0);
    let mut total = BigDecimal::from(0);
    let mut orders: Vec<PlannedOrder> = Vec::new();
    let mut index_by_restaurant: HashMap<i32, usize> = HashMap::new();

    for (line_no, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(CartError::InvalidQuantity {
                line: line_no,
                quantity: line.quantity,
            });
        }
        if line.price < zero {
            return Err(CartError::NegativePrice { line: line_no });
        }
        if line.price.with_scale(PRICE_SCALE) != line.price {
            return Err(CartError::PriceTooPrecise { line: line_no });
        }

        let subtotal = line.subtotal();
        total += &subtotal;

        let idx = *index_by_restaurant
            .entry(line.restaurant_id)
            .or_insert_with(|| {
                orders.push(PlannedOrder {
                    restaurant_id: line.restaurant_id,
                    total_price: BigDecimal::from(0),
                    items: Vec::new(),
                });
                orders.len() - 1
            });

        let order = &mut orders[idx];
        order.total_price += &subtotal;
        order.items.push(PlannedItem {
            menu_item_id: line.menu_item_id,
            quantity: line.quantity,
            price: line.price.clone(),
        });
    }

    Ok(CheckoutPlan { total, orders })
}
