//! odk-daemon library surface: config → engine assembly.
//!
//! The binary in `main.rs` stays thin; everything assemblable and
//! testable lives here.

pub mod boot;
