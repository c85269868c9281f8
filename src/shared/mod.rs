pub mod error;
pub mod error_code;
pub mod jwt;
pub(crate) mod mutex_ext;
pub mod security;
pub mod time;
