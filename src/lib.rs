//! TRADECYCLE: single-shot trading cycle orchestrator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod analysis;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod storage;
pub mod strategy;
pub mod types;
