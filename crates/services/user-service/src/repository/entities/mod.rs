//! Row shapes returned by the repository queries.

pub mod api_key;
pub mod user;
