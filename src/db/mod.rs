mod catalog;
pub mod core;
mod history;
mod organization;
mod schema;

pub use self::core::Database;
pub use sqlx::Row;
