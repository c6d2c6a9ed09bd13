//! Meeting server storage
//!
//! This crate provides:
//! - Record types for users, slots, meetings and minutes
//! - The [`Database`] handle each connection owns privately
//! - An in-memory [`Backend`] with optional JSON snapshot
//! - The per-meeting minutes file store

mod database;
mod memory;
mod minutes;

pub use database::*;
pub use memory::*;
pub use minutes::*;
