pub mod accounts;
pub mod authentication;
pub mod permissions;
pub mod user;

pub use authentication::*;
pub use permissions::*;
pub use user::*;
