pub mod framework;
pub mod schema;
pub mod state;
