pub mod crypto;
pub mod password;
