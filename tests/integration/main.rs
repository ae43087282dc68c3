//! Integration tests: full cycles against an in-memory store with
//! deterministic strategies and analyzers.

mod scenarios;
