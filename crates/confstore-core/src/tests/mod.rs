// Shared fixtures and cross-module scenarios
pub mod common;
mod integration;
