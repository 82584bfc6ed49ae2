//! Stored documents

pub mod deployment;
pub mod project;
