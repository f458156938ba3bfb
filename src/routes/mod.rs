//! HTTP route handlers outside the auth module.

pub mod catchers;
pub mod health;
