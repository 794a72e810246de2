//! Command handlers

pub mod config;
pub mod link;
pub mod note;
pub mod tag;
pub mod watch;
