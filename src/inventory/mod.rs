pub mod error;
pub mod repository;

pub use error::*;
pub use repository::*;
