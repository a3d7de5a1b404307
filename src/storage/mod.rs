pub mod db;
mod kv;
pub mod models;
mod tables;
pub mod users;

pub use db::{Database, DatabaseError};
pub use tables::*;
pub use users::UserStoreError;
