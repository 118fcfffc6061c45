//! Data transfer objects
//!
//! Serializable documents exchanged with the outside world. The node's
//! in-memory state is rebuilt from (and written back to) these shapes.

pub mod config;
