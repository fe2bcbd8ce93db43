//! Request handlers.

pub mod account;
pub mod admin;
pub mod billing;
pub mod health;
pub mod tools;

pub use health::{health, ready};
