//! Domain types and rules shared by the delivery services.
//!
//! Nothing in this crate touches the network or the database.

pub mod cart;
pub mod notification;
pub mod order;

pub use cart::*;
pub use notification::*;
pub use order::*;
