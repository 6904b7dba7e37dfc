pub mod agent;
pub mod error;
pub mod management;
pub mod metrics;
pub mod probe;

pub use agent::{HealthProbe, NodeAgent};
pub use error::{AgentError, Result};
