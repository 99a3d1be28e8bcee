pub mod api;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod messaging;
pub mod models;
pub mod orders;
pub mod preferences;
pub mod ratings;
pub mod schema;
