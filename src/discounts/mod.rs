pub mod engine;
pub mod error;
pub mod models;
pub mod repository;

pub use engine::*;
pub use error::*;
pub use models::*;
pub use repository::*;
