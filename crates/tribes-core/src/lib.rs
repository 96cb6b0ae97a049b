//! tribes-core - Core library for Tribes
//!
//! This crate holds the models, the `SQLite` storage layer and the engine
//! behind collaboratively owned lists: ownership, time-bounded sharing with
//! tribes, expiry sweeping, synchronization with external sources, conflict
//! resolution and weighted menu generation.

pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod menu;
pub mod models;
pub mod services;
pub mod sweeper;
pub mod sync;
mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use menu::MenuGenerator;
pub use models::{List, ListId, ListItem, Owner, TribeId, UserId};
pub use services::{ListService, MembershipProvider, StaticMembership};
pub use sweeper::ExpirationSweeper;
pub use sync::{SyncAdapter, SyncCoordinator};
