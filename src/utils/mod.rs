//! Shared helpers.

pub mod log;
pub mod slug;
