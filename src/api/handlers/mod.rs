pub mod auth;
pub mod health;
pub mod images;
pub mod sync;
pub mod tokens;
pub mod upload;
