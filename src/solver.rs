use crate::assignment_spec::{AssignmentSpecification, MatrixResultsSpecification};
use crate::error::SolverError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    Uncongested,
    Congested,
}

/// Per-call context handed to the solver alongside a specification.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation<'a> {
    pub class_name: &'a str,
    /// `false` resets loaded volumes, `true` adds onto the previous classes'
    pub add_volumes: bool,
    pub kind: AssignmentKind,
}

/// External equilibrium solver for one scenario type.
///
/// Each call blocks until the solver finishes and either fully applies its
/// results to the scenario or fails.
pub trait TransitSolver<S: ?Sized> {
    fn assign(
        &self,
        scenario: &S,
        specification: &AssignmentSpecification,
        invocation: &Invocation<'_>,
    ) -> Result<(), SolverError>;

    /// Extracts skim matrices from the strategies saved by the preceding
    /// [`TransitSolver::assign`] call for the same class.
    fn matrix_results(
        &self,
        scenario: &S,
        specification: &MatrixResultsSpecification,
        class_name: &str,
    ) -> Result<(), SolverError>;
}
