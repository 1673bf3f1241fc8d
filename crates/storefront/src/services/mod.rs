//! Business logic services for storefront.
//!
//! - `auth` - Password registration and login
//! - `checkout` - Turning a cart into a priced order

pub mod auth;
pub mod checkout;
