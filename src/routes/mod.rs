pub mod acl;
pub mod auth;
pub mod health;
pub mod posts;
pub mod registrations;
