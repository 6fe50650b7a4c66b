//! questlog - progression engine for a gamified productivity tracker
//!
//! Completing tasks and checking in habits earns XP. XP drives levels,
//! achievements unlock from accumulated activity, and one daily challenge per
//! date rewards coins and bonus XP.
//!
//! ## Layout
//!
//! - [`progression`]: pure XP, level, streak, achievement and challenge logic,
//!   plus [`ProgressionEngine`](progression::ProgressionEngine), which runs a
//!   completion event through every stage under a per-user lock.
//! - [`store`]: the [`ProgressStore`](store::ProgressStore) trait and its
//!   SQLite implementation. The append-only XP ledger is the source of truth.
//! - [`config`]: `~/.questlog/config.toml`.

pub mod config;
pub mod error;
pub mod progression;
pub mod store;

pub use error::{ProgressError, Result};
