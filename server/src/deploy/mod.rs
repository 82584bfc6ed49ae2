//! Deployment orchestration engine

pub mod command;
pub mod docker;
pub mod fsm;
pub mod identifiers;
pub mod orchestrator;
pub mod parser;
pub mod repository;
pub mod resolver;
pub mod runner;
pub mod summary;
pub mod terraform;

pub use orchestrator::{BranchReset, Orchestrator, PlanOutcome, StepOutcome, StepRequest};
