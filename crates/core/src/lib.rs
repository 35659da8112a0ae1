//! Core business logic for pollo.

pub mod services;

pub use services::*;
