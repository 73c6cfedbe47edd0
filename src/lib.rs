//! SwiftMart Core
//!
//! Order lifecycle, coupons, inventory, and payments for the SwiftMart
//! platform, served as one axum application.
//!
//! ## Services
//! - Order management: cart mutation, coupon application, order placement,
//!   guarded status transitions, route batching
//! - Promotions: coupon validation and the atomic usage increment
//! - Inventory: stock levels with an append-only movement ledger
//! - Payments: mocked gateway, transactions, and the durable status-sync
//!   outbox back to order management
//! - Notifications: WebSocket fan-out to connected users
//!
//! A `pending` order doubles as the user's cart; payment finalization is
//! what drives it to `placed`, delivered through the outbox worker so the
//! order eventually reflects the payment outcome even across downstream
//! failures.

pub mod auth;
pub mod clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod promotions;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;
