//! Unit tests for remedy modules
//!
//! These tests cover individual components without spawning the engine.

mod test_config;
mod test_pipeline;
