//! Authorization: permission resolution with wildcard expansion, a
//! TTL-bounded per-user cache, and the idempotent ACL seed.
//!
//! Grants always come from the database through the cache; the role claim
//! in a bearer token is a display hint and is never consulted here.

mod cache;
mod engine;
pub mod seed;

pub use cache::PermissionCache;
pub use engine::{grants, DbPermissionSource, PermissionEngine, PermissionSource};

/// Well-known role codes
pub mod roles {
    pub const GUEST: &str = "guest";
    pub const MEMBER: &str = "member";
    pub const EDITOR: &str = "editor";
    pub const OPERATOR: &str = "operator";
    pub const ADMIN: &str = "admin";
}

/// Well-known tier codes
pub mod tiers {
    pub const ASSOCIATE: &str = "associate";
    pub const CORPORATE: &str = "corporate";
    pub const PREMIUM: &str = "premium";
}

/// Permission keys referenced directly by handlers. Content CRUD keys are
/// derived from the post type (`PostType::permission`).
pub mod keys {
    pub const NEWS_MANAGE: &str = "news.manage";
    pub const EVENT_MANAGE: &str = "event.manage";
    pub const RESOURCE_MANAGE: &str = "resource.manage";
    pub const ACL_MANAGE: &str = "acl.manage";
}
