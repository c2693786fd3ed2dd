//! Shared types, configuration, error taxonomy, and cost/credit accounting
//! for the pipeline engine. Every other crate in the workspace depends on
//! this one; it depends on nothing else in the workspace.

pub mod config;
pub mod cost_calculator;
pub mod error;
pub mod input_validator;
pub mod types;
