pub mod images;
pub mod upload_tokens;
pub mod users;

pub mod prelude {
    pub use super::images::Entity as Images;
    pub use super::upload_tokens::Entity as UploadTokens;
    pub use super::users::Entity as Users;
}
