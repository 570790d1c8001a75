//! Dubforge - Media dubbing orchestration tool
//!
//! This library crate exposes config loading and application wiring for
//! integration testing.

pub mod app;
pub mod config;
