pub mod error;
pub mod models;
pub mod repository;
pub mod resolver;

pub use error::*;
pub use models::*;
pub use repository::*;
pub use resolver::*;
