//! Multi-class extended transit assignment.
//!
//! The crate prepares a scenario for an external transit equilibrium solver,
//! invokes it once per demand class and restores the scenario afterwards.
//! Engines plug in through [`Scenario`] (network, attribute, matrix and
//! function store) and [`TransitSolver`] (the solver itself); [`memory`]
//! provides an in-process implementation of both.
//!
//! ```no_run
//! use transit_assign::memory::{MemoryScenario, RecordingSolver};
//! use transit_assign::{AssignmentParameters, Network, TransitAssignment};
//!
//! # fn main() -> transit_assign::Result<()> {
//! let params = AssignmentParameters::from_path("assignment.json")?;
//! let scenario = MemoryScenario::new(params.scenario_number, Network::default());
//! let solver = RecordingSolver::new();
//! let report = TransitAssignment::new(&scenario, &solver, &params).run()?;
//! println!("assigned {:?}", report.classes_assigned);
//! # Ok(())
//! # }
//! ```

pub mod assignment_spec;
pub mod attributes;
pub mod calculation;
pub mod config;
pub mod connectors;
pub mod error;
pub mod gtfs;
pub mod healing;
pub mod journey;
pub mod memory;
pub mod network;
pub mod orchestrator;
pub mod progress;
pub mod resources;
pub mod scenario;
pub mod solver;
pub mod ttf_remap;

pub use assignment_spec::{AssignmentSpecification, MatrixResultsSpecification};
pub use config::{AssignmentParameters, ModeFilter, OutputMatrix, TransitClassParameters};
pub use error::{EngineError, Error, Result};
pub use journey::{JourneyLevels, JourneyState};
pub use network::Network;
pub use orchestrator::{RunReport, RunState, Stage, TransitAssignment};
pub use progress::Progress;
pub use scenario::{ElementType, FunctionId, MatrixId, ModeId, Scenario};
pub use solver::{AssignmentKind, Invocation, TransitSolver};
