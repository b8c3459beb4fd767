//! Multi-class transit assignment pipeline
//!
//! Stages run strictly in order:
//! validate → heal → acquire resources → compute attributes → mark choice
//! points → remap functions → assign classes → release resources.
//!
//! Temporaries are held by scoped guards, so a failure at any stage unwinds
//! the function remapping first and the temporary matrices and attributes
//! after it. Classes are assigned in the order they are declared: the first
//! resets the network's loaded volumes and every later class adds to them.
//! Output matrices of classes that completed before a failure keep their
//! values; completed solver calls are not rolled back.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, info_span};

use crate::assignment_spec::{AssignmentSpecBuilder, ClassMatrices, MatrixResultsSpecification};
use crate::attributes::{
    apply_walk_perceptions, assign_effective_headway, change_walk_speed, reset_walk_perception,
};
use crate::config::{AssignmentParameters, TransitClassParameters};
use crate::connectors::publish_efficient_connector_network;
use crate::error::{Error, Result, SolverError};
use crate::healing::heal_travel_time_functions;
use crate::network::ModeKind;
use crate::progress::{Progress, ProgressTracker};
use crate::resources::TemporaryScope;
use crate::scenario::{ElementType, MatrixId, Scenario};
use crate::solver::{AssignmentKind, Invocation, TransitSolver};
use crate::ttf_remap::TtfRemapScope;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Heal,
    AcquireResources,
    ComputeAttributes,
    MutateChoiceNetwork,
    RemapTtfs,
    AssignPerClass,
    ReleaseResources,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Validate,
        Stage::Heal,
        Stage::AcquireResources,
        Stage::ComputeAttributes,
        Stage::MutateChoiceNetwork,
        Stage::RemapTtfs,
        Stage::AssignPerClass,
        Stage::ReleaseResources,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Stage),
    Completed,
    Failed(Stage),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    pub healed_functions: usize,
    /// `None` when logit choice at regular nodes is disabled
    pub choice_points: Option<usize>,
    pub remapped_functions: BTreeMap<u32, u32>,
    /// cross-row protected functions, original and remapped ids
    pub protected_functions: BTreeSet<u32>,
    pub classes_assigned: Vec<String>,
    pub released_temporaries: usize,
}

pub struct TransitAssignment<'a, S: Scenario + ?Sized, V> {
    scenario: &'a S,
    solver: &'a V,
    params: &'a AssignmentParameters,
    tracker: ProgressTracker,
    state: Cell<RunState>,
}

impl<'a, S, V> TransitAssignment<'a, S, V>
where
    S: Scenario + ?Sized,
    V: TransitSolver<S>,
{
    pub fn new(scenario: &'a S, solver: &'a V, params: &'a AssignmentParameters) -> Self {
        Self {
            scenario,
            solver,
            params,
            tracker: ProgressTracker::new(Stage::ALL.len()),
            state: Cell::new(RunState::Idle),
        }
    }

    pub fn progress(&self) -> Progress {
        self.tracker.progress()
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn run(&self) -> Result<RunReport> {
        let _span = info_span!("transit_assignment", scenario = self.scenario.number()).entered();
        self.tracker.reset();

        let result = self.execute();
        match &result {
            Ok(report) => {
                self.state.set(RunState::Completed);
                info!(classes = report.classes_assigned.len(), "transit assignment completed");
            }
            Err(err) => {
                let stage = match self.state.get() {
                    RunState::Running(stage) => stage,
                    _ => Stage::Validate,
                };
                self.state.set(RunState::Failed(stage));
                error!(?stage, error = %err, "transit assignment failed");
            }
        }
        result
    }

    fn enter(&self, stage: Stage) {
        self.state.set(RunState::Running(stage));
        info!(?stage, "starting stage");
    }

    fn execute(&self) -> Result<RunReport> {
        let (scenario, params) = (self.scenario, self.params);
        let mut report = RunReport::default();

        self.enter(Stage::Validate);
        self.validate()?;
        self.tracker.complete_subtask();

        self.enter(Stage::Heal);
        report.healed_functions = heal_travel_time_functions(scenario)?;
        if report.healed_functions == 0 {
            info!("no problems were found in transit time functions");
        }
        self.tracker.complete_subtask();

        self.enter(Stage::AcquireResources);
        let mut temporaries = TemporaryScope::new(scenario);
        let class_matrices = self.prepare_matrices(&mut temporaries)?;
        temporaries.attribute(
            ElementType::TransitLine,
            Some(params.effective_headway_attribute.as_str()),
            0.0,
        )?;
        temporaries.attribute(
            ElementType::Node,
            Some(params.headway_fraction_attribute.as_str()),
            0.5,
        )?;
        for class in &params.transit_classes {
            temporaries.attribute(
                ElementType::Link,
                Some(class.walk_time_perception_attribute.as_str()),
                1.0,
            )?;
        }
        self.tracker.complete_subtask();

        self.enter(Stage::ComputeAttributes);
        change_walk_speed(scenario, params.walk_speed)?;
        assign_effective_headway(
            scenario,
            &params.effective_headway_attribute,
            params.effective_headway_slope,
        )?;
        // classes may share an attribute, so every reset precedes every override
        let walk_attributes: BTreeSet<&str> = params
            .transit_classes
            .iter()
            .map(|class| class.walk_time_perception_attribute.as_str())
            .collect();
        for attribute in walk_attributes {
            reset_walk_perception(scenario, attribute)?;
        }
        for class in &params.transit_classes {
            apply_walk_perceptions(
                scenario,
                &class.walk_time_perception_attribute,
                &class.walk_perceptions,
            )?;
        }
        self.tracker.complete_subtask();

        self.enter(Stage::MutateChoiceNetwork);
        if params.node_logit_scale.is_some() {
            report.choice_points = Some(publish_efficient_connector_network(scenario)?);
        }
        self.tracker.complete_subtask();

        self.enter(Stage::RemapTtfs);
        let remap = TtfRemapScope::open(scenario, &params.ttf_definitions, &params.xrow_ttf_range)?;
        if params.surface_transit_speed {
            remap.apply_to_segments()?;
        }
        report.remapped_functions = remap.mapping().clone();
        report.protected_functions = remap.protected().clone();
        self.tracker.complete_subtask();

        self.enter(Stage::AssignPerClass);
        let transit_modes = scenario
            .modes()
            .into_iter()
            .filter(|mode| mode.kind == ModeKind::Transit)
            .map(|mode| mode.id)
            .collect();
        let builder = AssignmentSpecBuilder::new(params, transit_modes);
        for (index, (class, matrices)) in params
            .transit_classes
            .iter()
            .zip(&class_matrices)
            .enumerate()
        {
            self.assign_class(&builder, index, class, matrices)?;
            report.classes_assigned.push(class.name.clone());
        }
        self.tracker.complete_subtask();

        self.enter(Stage::ReleaseResources);
        drop(remap);
        report.released_temporaries = temporaries.release_all();
        self.tracker.complete_subtask();

        Ok(report)
    }

    /// Checks everything the run relies on before anything is mutated.
    fn validate(&self) -> Result<()> {
        let params = self.params;
        let mut required = Vec::new();
        for class in &params.transit_classes {
            required.push(("walk perception", &class.walk_time_perception_attribute));
            required.push(("segment fare", &class.segment_fare_attribute));
            required.push(("link fare", &class.link_fare_attribute_id));
        }
        required.push(("effective headway", &params.effective_headway_attribute));
        required.push(("headway fraction", &params.headway_fraction_attribute));

        for (role, name) in required {
            if self.scenario.extra_attribute(name).is_none() {
                return Err(Error::MissingAttribute {
                    role,
                    name: name.clone(),
                });
            }
        }

        for class in &params.transit_classes {
            class.outputs()?;
            let demand = class.demand_matrix;
            if !demand.is_none() && self.scenario.matrix(demand).is_none() {
                return Err(Error::MissingMatrix(demand));
            }
        }
        Ok(())
    }

    fn prepare_matrices(&self, temporaries: &mut TemporaryScope<'a, S>) -> Result<Vec<ClassMatrices>> {
        let mut prepared = Vec::with_capacity(self.params.transit_classes.len());
        for class in &self.params.transit_classes {
            let demand = if class.demand_matrix.is_none() {
                temporaries.matrix(
                    MatrixId::NONE,
                    &format!("Temporary demand for class {}", class.name),
                    0.0,
                )?
            } else {
                class.demand_matrix
            };

            if class.impedance_matrix.is_none() {
                info!(class = %class.name, "creating temporary impedance matrix");
            }
            let impedance = temporaries.matrix(
                class.impedance_matrix,
                &format!("Transit perceived travel times for {}", class.name),
                0.0,
            )?;

            let mut outputs = BTreeMap::new();
            for (kind, id) in class.outputs()? {
                let description = format!("{} for class {}", kind.description(), class.name);
                outputs.insert(kind, temporaries.matrix(id, &description, 0.0)?);
            }

            prepared.push(ClassMatrices {
                demand,
                impedance,
                outputs,
            });
        }
        Ok(prepared)
    }

    fn assign_class(
        &self,
        builder: &AssignmentSpecBuilder<'_>,
        index: usize,
        class: &TransitClassParameters,
        matrices: &ClassMatrices,
    ) -> Result<()> {
        let _span = info_span!("class", name = %class.name, index).entered();
        let solver_failed = |source: SolverError| Error::Solver {
            class: class.name.clone(),
            source,
        };

        let specification = builder.build(class, matrices);
        let invocation = Invocation {
            class_name: &class.name,
            add_volumes: index != 0,
            kind: if self.params.congested_assignment {
                AssignmentKind::Congested
            } else {
                AssignmentKind::Uncongested
            },
        };
        self.solver
            .assign(self.scenario, &specification, &invocation)
            .map_err(solver_failed)?;

        if let Some(results) = MatrixResultsSpecification::for_class(class, matrices) {
            self.solver
                .matrix_results(self.scenario, &results, &class.name)
                .map_err(solver_failed)?;
        }
        info!(add_volumes = invocation.add_volumes, "class assigned");
        Ok(())
    }
}
