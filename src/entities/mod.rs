pub mod prelude;

pub mod comments;
pub mod pages;
pub mod tokens;
pub mod users;
