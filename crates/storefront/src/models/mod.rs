//! Domain models for the storefront.
//!
//! Every stored entity implements [`crate::db::Entity`] so it can travel
//! through the fallback repository.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod review;
pub mod session;
pub mod user;

pub use cart::{Cart, CartItem};
pub use catalog::{Discount, Product};
pub use order::{Order, OrderLine};
pub use review::{Review, ReviewSummary};
pub use session::SessionClaims;
pub use user::{User, UserProfile};
