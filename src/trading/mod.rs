//! Position opening, exit ladders, and the loops that drive them

pub mod executor;
pub mod orchestrator;
pub mod position;

pub use executor::{ExecutionProvider, HttpExecutor, SimulatedExecutor};
pub use orchestrator::Orchestrator;
pub use position::{Position, PositionBook};
