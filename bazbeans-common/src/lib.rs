//! Shared coordination fabric for the BazBeans fleet.
//!
//! This crate owns the coordinator key schema, the node registry, the
//! per-node command bus, the membership event bus, and the IP resolver
//! chain. The three binaries (`bazbeans-agent`, `bazbeans-proxy-updater`,
//! `bazbeans-ctl`) are all thin drivers over these modules.

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod plugins;
pub mod registry;
pub mod resolvers;
pub mod secret;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::BazBeansConfig;
pub use coordinator::{CoordinatorClient, RedisCoordinatorClient};
pub use error::{CoordinatorError, Result};
pub use types::{Command, CommandResult, Event, EventKind, Heartbeat, Metrics, NodeId, NodeStatus};
