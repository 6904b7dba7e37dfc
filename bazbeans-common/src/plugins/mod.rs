//! Pluggable command handlers. The agent holds an open-ended registry
//! mapping command `kind` to a handler; plugins expose a factory yielding
//! `{kind → handler}` pairs merged in at construction time. Built-in kinds
//! are registered first and may be shadowed by a plugin registering the
//! same kind.

pub mod compose;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type HandlerOutput = std::result::Result<Value, String>;

/// A single command handler. Handlers never panic the caller: any failure
/// is surfaced as `Err(message)` and written back as an `error_<kind>`
/// status by the dispatcher, never propagated as a hard error.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, args: &Map<String, Value>) -> HandlerOutput;
}

/// A bundle of command handlers contributed by a host process or an
/// optional built-in plugin (e.g. the compose plugin below).
pub trait CommandPlugin {
    fn handlers(&self) -> Vec<(String, Arc<dyn CommandHandler>)>;
}
