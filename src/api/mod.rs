pub mod error;
pub mod installer;
