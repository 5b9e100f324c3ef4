//! Influx Provider Core
//!
//! Provider-agnostic plumbing shared by the InfluxDB provider and its host:
//!
//! - [`action`]: planned actions (create, update, replace, delete) and the
//!   attribute changes that motivate them
//! - [`state`]: the local `.influx-provider/state.json` file recording remote
//!   identifiers, with a backup copy and an exclusive lock
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               influx-provider-cli                │
//! │        (bucket / authorization commands)         │
//! └───────────┬──────────────────────┬──────────────┘
//!             │                      │
//! ┌───────────▼──────────┐ ┌─────────▼──────────────┐
//! │   influx-provider    │ │  influx-provider-core  │
//! │  client, reconciler  │ │   actions, state file  │
//! └───────────┬──────────┘ └────────────────────────┘
//!             │
//! ┌───────────▼──────────┐
//! │   InfluxDB v2 API    │
//! └──────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, Change, classify};
pub use error::{ProviderError, Result};
pub use state::{
    GlobalState, ResourceState, ResourceStatus, StateLock, StateManager, resource_key,
};
