//! API request handlers

pub mod health;
pub mod segments;
pub mod users;
