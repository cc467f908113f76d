//! Storage layer: all SQL lives here so the query/filter logic is shared
//! between the HTTP handlers and the operational binaries.

pub mod legacy;
pub mod memberships;
pub mod meta;
pub mod posts;
pub mod registrations;
