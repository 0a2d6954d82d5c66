//! PostgreSQL implementation of the persistence contract.

mod repository;

pub use repository::*;
