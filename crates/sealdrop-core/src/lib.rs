pub mod config;
pub mod error;
pub mod link;
pub mod types;

pub use error::{SealdropError, SealdropResult};
