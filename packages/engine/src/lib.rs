// ABOUTME: Execution core for Crewyard
// ABOUTME: Runtime contract, plan compiler and the background run driver

pub mod driver;
pub mod planner;
pub mod runtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use driver::{ExecutionDriver, CANCELLED_REASON};
pub use planner::{compile, compile_blocking, Plan};
pub use runtime::{AgentSpec, CrewSpec, ManagerSpec, RuntimeFactory, TaskSpec};
