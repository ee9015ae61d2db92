//! TIPFUSION — multi-engine probability fusion and stake sizing.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod math;
pub mod engine;
pub mod fusion;
pub mod strategy;
pub mod backtest;
