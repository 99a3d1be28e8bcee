use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a row in the `notifications` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    FoodDelivered,
    NewMenuItemInFavoriteRest,
    SubscribeApp,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FoodDelivered => "FoodDelivered",
            NotificationKind::NewMenuItemInFavoriteRest => "NewMenuItemInFavoriteRest",
            NotificationKind::SubscribeApp => "SubscribeApp",
        }
    }

    /// Broadcast kinds go to every topic subscriber instead of one customer.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, NotificationKind::SubscribeApp)
    }

    pub fn email_subject(&self) -> &'static str {
        match self {
            NotificationKind::FoodDelivered => "Your order has been delivered",
            NotificationKind::NewMenuItemInFavoriteRest => {
                "Something new at one of your favorite restaurants"
            }
            NotificationKind::SubscribeApp => "News from the app",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload emitted by the `notifications` insert trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: i32,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub customer_id: Option<i32>,
}

/// A customer-facing preference that can be toggled on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPreference {
    FoodDelivered,
    NewMenuItemInFavoriteRest,
    SubscribeApp,
}

impl NotificationPreference {
    pub const ALL: [NotificationPreference; 3] = [
        NotificationPreference::FoodDelivered,
        NotificationPreference::NewMenuItemInFavoriteRest,
        NotificationPreference::SubscribeApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPreference::FoodDelivered => "foodDelivered",
            NotificationPreference::NewMenuItemInFavoriteRest => "newMenuItemInFavoriteRest",
            NotificationPreference::SubscribeApp => "subscribeApp",
        }
    }
}

impl fmt::Display for NotificationPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification preference: {0}")]
pub struct UnknownPreference(pub String);

impl FromStr for NotificationPreference {
    type Err = UnknownPreference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationPreference::ALL
            .into_iter()
            .find(|pref| pref.as_str() == s)
            .ok_or_else(|| UnknownPreference(s.to_string()))
    }
}

/// The three preference flags of a customer's settings row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFlags {
    pub food_delivered: bool,
    pub new_menu_item_in_favorite_rest: bool,
    pub subscribe_app: bool,
}

impl NotificationFlags {
    pub fn get(&self, pref: NotificationPreference) -> bool {
        match pref {
            NotificationPreference::FoodDelivered => self.food_delivered,
            NotificationPreference::NewMenuItemInFavoriteRest => {
                self.new_menu_item_in_favorite_rest
            }
            NotificationPreference::SubscribeApp => self.subscribe_app,
        }
    }

    pub fn set(&mut self, pref: NotificationPreference, enabled: bool) {
        let flag = match pref {
            NotificationPreference::FoodDelivered => &mut self.food_delivered,
            NotificationPreference::NewMenuItemInFavoriteRest => {
                &mut self.new_menu_item_in_favorite_rest
            }
            NotificationPreference::SubscribeApp => &mut self.subscribe_app,
        };
        *flag = enabled;
    }
}
