//! # winmap
//!
//! Window registry and controller core of a tiling window manager.
//!
//! winmap keeps the authoritative mapping between native window handles and
//! the correlation ids the rest of the manager uses, decides which windows it
//! may touch, strips and restores window chrome, and carries out placement
//! commands while checking what the OS actually did.
//!
//! ## Architecture
//!
//! - `native`: the capability surface over the OS, plus an in-memory desktop
//! - `ids`: correlation id allocation
//! - `policy`: tiling and chrome predicates driven by configuration
//! - `bus`: inbound notifications and commands, published events
//! - `window`: records, the registry, chrome, restoration and placement
//! - `mapper`: the controller tying it all together
//! - `config`: TOML configuration
//! - `scenario`: replay scripts for the headless desktop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use winmap::{HeadlessDesktop, RecordingSink, RulePolicy, SequentialIdAllocator};
//! use winmap::{UserIdentity, WindowMapper, WinmapConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = WinmapConfig::default();
//!     let desktop = Arc::new(HeadlessDesktop::new(1, UserIdentity::new("alice", "WORKGROUP")));
//!     let mut mapper = WindowMapper::new(
//!         desktop,
//!         Box::new(RulePolicy::from_config(&config)),
//!         Box::new(SequentialIdAllocator::new()),
//!         Box::new(RecordingSink::new()),
//!         config.mapper.clone(),
//!     )?;
//!     mapper.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod ids;
pub mod mapper;
pub mod native;
pub mod policy;
pub mod scenario;
pub mod window;

// Re-export main types for easy access
pub use bus::{Command, EventSink, Inbound, OsEvent, PublishedEvent, RecordingSink, Target, WindowEventKind};
pub use config::WinmapConfig;
pub use ids::{CorrelationId, IdAllocator, SequentialIdAllocator};
pub use mapper::{Admission, Rejection, WindowMapper};
pub use native::{HeadlessDesktop, NativeError, NativeSurface, UserIdentity, WindowHandle};
pub use policy::{RulePolicy, WindowPolicy};
pub use scenario::Scenario;
pub use window::{WindowInfo, WindowRecord, WindowRegistry};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for winmap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
