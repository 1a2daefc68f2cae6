/// Diesel table definitions
pub mod schema;
