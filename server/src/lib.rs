//! spacectl library
//!
//! Drives the Terraform init/plan/apply/destroy lifecycle of project spaces
//! inside a shared, long-lived container.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
