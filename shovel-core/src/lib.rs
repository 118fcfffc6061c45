//! Shovel Core
//!
//! Core types and abstractions shared by Shovel nodes and tools.
//!
//! This crate contains:
//! - Domain types: peers, tasks and trigger kinds
//! - DTOs: the persisted configuration document
//! - Protocol: the plaintext command model spoken between nodes

pub mod domain;
pub mod dto;
pub mod protocol;
