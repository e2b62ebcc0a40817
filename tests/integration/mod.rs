//! Integration tests for remedy
//!
//! Exercise the engine end to end with mock command runners, and the binary
//! through `assert_cmd`. Nothing here touches the network or runs real
//! remediation commands.

mod health_tests;
mod helpers;
mod queue_tests;
mod scenario_tests;

pub use helpers::*;
