//! Caller identity extraction.

mod middleware;

pub use middleware::{AuthUser, ROLE_HEADER};
