pub mod catalog;
pub mod image_service;
pub mod oauth;
pub mod storage;
pub mod sync_service;
pub mod token_service;
pub mod upload_service;
