//! REST models for the spacectl deployment API

pub mod models;
