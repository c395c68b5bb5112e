//! Domain layer - Core records of the user service.
//!
//! This crate contains plain data with no infrastructure dependencies.
//! The persistence layer maps its rows into these types.

pub mod api_key;
pub mod constants;
pub mod user;

pub use api_key::ApiKey;
pub use constants::*;
pub use user::User;
