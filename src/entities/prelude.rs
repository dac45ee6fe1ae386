pub use super::comments::Entity as Comments;
pub use super::pages::Entity as Pages;
pub use super::tokens::Entity as Tokens;
pub use super::users::Entity as Users;
