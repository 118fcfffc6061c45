//! Core domain types
//!
//! These types are shared between the node (which owns and executes
//! pipelines) and the CLI (which only inspects peers and sends commands).

pub mod peer;
pub mod task;
pub mod trigger;
