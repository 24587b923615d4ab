//! Entity models.

pub mod identity;
pub mod message;
pub mod friend_request;
pub mod user;
pub mod presence;
