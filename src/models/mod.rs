pub mod requests;
pub mod responses;
pub mod settings;
pub mod state;
