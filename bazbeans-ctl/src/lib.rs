pub mod cli;
pub mod controller;
pub mod error;
pub mod output;

pub use controller::OperatorController;
pub use error::{CtlError, Result};
