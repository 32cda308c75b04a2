//! Request handlers.

pub mod health;
pub mod jobs;
pub mod schema;
pub mod tools;

pub use health::*;
pub use jobs::*;
pub use schema::*;
pub use tools::*;
