//! Shared helpers for the workers and the binary.

pub mod bootstrap;
pub mod retry;
