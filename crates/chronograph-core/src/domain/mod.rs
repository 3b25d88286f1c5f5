//! Domain layer
//!
//! - **versioning**: append-only version histories
//! - **decay**: confidence decay and reinforcement
//! - **index**: bidirectional relationship index
//! - **graph**: point-in-time graph reconstruction
//! - **temporal**: the service tying them together

pub mod decay;
pub mod graph;
pub mod index;
pub mod temporal;
pub mod versioning;
