//! Langbase Pipes client used as the reasoning agent's completion backend.

mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use client::LangbaseClient;
pub use types::*;
