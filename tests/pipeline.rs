use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};
use transit_assign::assignment_spec::NodeChoices;
use transit_assign::memory::{MemoryScenario, RecordingSolver};
use transit_assign::network::{Link, ModeKind, Node, TransitLine};
use transit_assign::resources::TemporaryResource;
use transit_assign::{
    AssignmentKind, AssignmentParameters, AssignmentSpecification, ElementType, Error, FunctionId,
    Invocation, MatrixId, ModeId, Network, RunState, Scenario, Stage, TransitAssignment,
    TransitSolver,
};

const BUS: ModeId = ModeId('b');
const METRO: ModeId = ModeId('m');
const WALK: ModeId = ModeId('w');

fn network() -> Network {
    let mut network = Network::default();
    network.add_mode('b', ModeKind::Transit, 0.0);
    network.add_mode('m', ModeKind::Transit, 0.0);
    network.add_mode('w', ModeKind::AuxTransit, 5.0);

    network.add_node(Node::centroid(1));
    network.add_node(Node::centroid(2));
    for number in [101, 102, 103, 100_001, 100_002] {
        network.add_node(Node::regular(number));
    }

    network.add_link(Link::new(1, 101, 0.2, &[WALK]));
    network.add_link(Link::new(101, 102, 1.0, &[BUS]));
    network.add_link(Link::new(102, 103, 1.5, &[BUS, METRO]));
    network.add_link(Link::new(103, 2, 0.3, &[WALK]));
    network.add_link(Link::new(100_001, 102, 0.0, &[WALK]));
    network.add_link(Link::new(100_002, 102, 0.0, &[WALK]));

    network.add_line(TransitLine::new("bus", BUS, 10.0), &[101, 102, 103], 1);
    network.add_line(TransitLine::new("metro", METRO, 25.0), &[102, 103], 2);
    for segment in &mut network.segments {
        segment.volume = 100.0;
    }
    network
}

fn scenario() -> MemoryScenario {
    let scenario = MemoryScenario::new(11, network());
    for (element, name) in [
        (ElementType::TransitLine, "@ehdw"),
        (ElementType::Node, "@frac"),
        (ElementType::Link, "@walkp"),
        (ElementType::TransitSegment, "@sfare"),
        (ElementType::Link, "@lfare"),
    ] {
        scenario.create_extra_attribute(element, name, 0.0).unwrap();
    }
    scenario
        .create_function(FunctionId::transit_time(1), "length*60/us1*(1+us3)")
        .unwrap();
    scenario
        .create_function(FunctionId::transit_time(2), "length*60/us1")
        .unwrap();
    scenario.set_matrix_value(MatrixId(10), 1, 2, 10.0);
    scenario.set_matrix_value(MatrixId(11), 1, 2, 5.0);
    scenario
}

fn class(name: &str, demand: &str) -> Value {
    json!({
        "name": name,
        "mode": "*",
        "demand_matrix": demand,
        "impedance_matrix": "mf0",
        "board_penalty_perception": 1.0,
        "fare_perception": 30.0,
        "wait_time_perception": 2.0,
        "walk_time_perception_attribute": "@walkp",
        "segment_fare_attribute": "@sfare",
        "link_fare_attribute_id": "@lfare",
        "walk_perceptions": [{"filter": "i=101,103", "walk_perception_value": 1.5}]
    })
}

fn params(classes: Vec<Value>) -> AssignmentParameters {
    params_with(classes, |_| {})
}

fn params_with(classes: Vec<Value>, edit: impl FnOnce(&mut Value)) -> AssignmentParameters {
    let mut document = json!({
        "scenario_number": 11,
        "walk_speed": 4.5,
        "transit_classes": classes,
        "effective_headway_attribute": "@ehdw",
        "effective_headway_slope": 0.25,
        "headway_fraction_attribute": "@frac",
        "node_logit_scale": false,
        "origin_distribution_logit_scale": 0.2,
        "surface_transit_speed": true,
        "ttf_definitions": [{"ttf": 1}, {"ttf": 2}],
        "xrow_ttf_range": [2]
    });
    edit(&mut document);
    serde_json::from_value(document).unwrap()
}

#[test]
fn a_full_run_prepares_assigns_and_restores_the_scenario() {
    let scenario = scenario();
    let solver = RecordingSolver::new();
    let mut with_outputs = class("X", "mf10");
    with_outputs["output_matrices"] = json!({"in_vehicle_time_matrix": "mf20", "fare_matrix": "mf0"});
    let params = params(vec![with_outputs, class("Y", "mf11")]);

    let assignment = TransitAssignment::new(&scenario, &solver, &params);
    let report = assignment.run().unwrap();

    assert_eq!(assignment.state(), RunState::Completed);
    assert_eq!(assignment.progress().completed, 8);
    assert_eq!(assignment.progress().fraction(), 1.0);

    assert_eq!(report.healed_functions, 1);
    assert_eq!(report.choice_points, None);
    assert_eq!(report.remapped_functions, BTreeMap::from([(1, 3), (2, 4)]));
    assert_eq!(report.protected_functions, BTreeSet::from([2, 4]));
    assert_eq!(report.classes_assigned, ["X", "Y"]);
    assert_eq!(report.released_temporaries, 2);

    // healed in place, remapped functions gone
    let functions: Vec<_> = scenario.functions().into_iter().map(|f| f.expression).collect();
    assert_eq!(functions, ["length*60/us1", "length*60/us1"]);
    assert_eq!(scenario.segment_functions(), [1, 1, 2]);
    assert_eq!(
        scenario.deletions(),
        [
            TemporaryResource::Function(FunctionId::transit_time(4)),
            TemporaryResource::Function(FunctionId::transit_time(3)),
            TemporaryResource::Matrix(MatrixId(2)),
            TemporaryResource::Matrix(MatrixId(1)),
        ]
    );
    assert_eq!(scenario.matrix_ids(), [MatrixId(10), MatrixId(11), MatrixId(20)]);

    let network = scenario.network();
    assert_eq!(network.lines[0].attributes["@ehdw"], 10.0);
    assert_eq!(network.lines[1].attributes["@ehdw"], 20.0);
    assert!(network.nodes.values().all(|node| node.attributes["@frac"] == 0.5));
    let walk = |i: u32| {
        network
            .links
            .iter()
            .find(|link| link.i == i)
            .map(|link| link.attributes["@walkp"])
    };
    assert_eq!(walk(1), Some(1.0));
    assert_eq!(walk(103), Some(1.5));
    assert_eq!(scenario.modes()[2].speed, 4.5);

    let calls = solver.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].specification.demand, MatrixId(10));
    assert_eq!(calls[0].specification.od_results.total_impedance, MatrixId(1));
    assert_eq!(calls[1].specification.od_results.total_impedance, MatrixId(2));
    assert!(calls.iter().all(|call| call.kind == AssignmentKind::Uncongested));

    let results = solver.matrix_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "X");
    assert_eq!(results[0].1.actual_in_vehicle_times, Some(MatrixId(20)));
    assert_eq!(results[0].1.actual_total_fares, None);
}

#[test]
fn the_first_class_resets_volumes_and_later_classes_add() {
    for order in [["X", "Y"], ["Y", "X"]] {
        let scenario = scenario();
        let solver = RecordingSolver::new();
        let demand = |name: &str| if name == "X" { "mf10" } else { "mf11" };
        let params = params(order.iter().map(|name| class(name, demand(name))).collect());

        TransitAssignment::new(&scenario, &solver, &params)
            .run()
            .unwrap();

        let calls: Vec<_> = solver
            .calls()
            .into_iter()
            .map(|call| (call.class_name, call.add_volumes))
            .collect();
        assert_eq!(
            calls,
            [(order[0].to_string(), false), (order[1].to_string(), true)]
        );
        assert_eq!(scenario.segment_volumes(), [15.0, 15.0, 15.0]);
    }
}

#[test]
fn missing_attributes_fail_before_anything_is_touched() {
    let scenario = scenario();
    scenario.delete_extra_attribute("@sfare").unwrap();
    let deletions_before = scenario.deletions();
    let solver = RecordingSolver::new();
    let params = params(vec![class("X", "mf10")]);

    let assignment = TransitAssignment::new(&scenario, &solver, &params);
    let error = assignment.run().unwrap_err();

    assert!(matches!(
        error,
        Error::MissingAttribute { role: "segment fare", ref name } if name == "@sfare"
    ));
    assert_eq!(assignment.state(), RunState::Failed(Stage::Validate));
    assert_eq!(assignment.progress().completed, 0);
    assert_eq!(scenario.deletions(), deletions_before);
    assert_eq!(
        scenario.function(FunctionId::transit_time(1)).unwrap().expression,
        "length*60/us1*(1+us3)"
    );
    assert_eq!(scenario.modes()[2].speed, 5.0);
    assert!(solver.calls().is_empty());
}

#[test]
fn a_missing_demand_matrix_is_reported() {
    let scenario = scenario();
    let solver = RecordingSolver::new();
    let params = params(vec![class("X", "mf50")]);

    let error = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap_err();
    assert!(matches!(error, Error::MissingMatrix(MatrixId(50))));
}

#[test]
fn a_sentinel_demand_uses_a_temporary_zero_matrix() {
    let scenario = scenario();
    let solver = RecordingSolver::new();
    let params = params(vec![class("X", "mf0")]);

    let report = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();

    let calls = solver.calls();
    assert_eq!(calls[0].specification.demand, MatrixId(1));
    assert_eq!(calls[0].specification.od_results.total_impedance, MatrixId(2));
    assert_eq!(report.released_temporaries, 2);
    assert_eq!(scenario.segment_volumes(), [0.0, 0.0, 0.0]);
}

#[test]
fn conflicting_congestion_terms_stop_the_run() {
    let scenario = scenario();
    scenario
        .create_function(FunctionId::transit_time(5), "us3*length")
        .unwrap();
    let solver = RecordingSolver::new();
    let params = params(vec![class("X", "mf10")]);

    let assignment = TransitAssignment::new(&scenario, &solver, &params);
    let error = assignment.run().unwrap_err();

    assert!(matches!(
        error,
        Error::ReservedCongestionVariable { function } if function == FunctionId::transit_time(5)
    ));
    assert_eq!(assignment.state(), RunState::Failed(Stage::Heal));
    assert_eq!(scenario.modes()[2].speed, 5.0);
    assert!(solver.calls().is_empty());
}

#[test]
fn a_solver_failure_releases_every_temporary() {
    let scenario = scenario();
    let solver = RecordingSolver::failing_on("B");
    let params = params(vec![
        class("A", "mf10"),
        class("B", "mf10"),
        class("C", "mf11"),
    ]);

    let assignment = TransitAssignment::new(&scenario, &solver, &params);
    let error = assignment.run().unwrap_err();

    match &error {
        Error::Solver { class, source } => {
            assert_eq!(class, "B");
            assert_eq!(source.to_string(), "solver aborted class B");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(std::error::Error::source(&error).is_some());
    assert_eq!(assignment.state(), RunState::Failed(Stage::AssignPerClass));
    assert_eq!(assignment.progress().completed, 6);

    let calls: Vec<_> = solver.calls().into_iter().map(|c| c.class_name).collect();
    assert_eq!(calls, ["A"]);

    assert_eq!(scenario.segment_functions(), [1, 1, 2]);
    assert!(scenario.function(FunctionId::transit_time(3)).is_none());
    assert!(scenario.function(FunctionId::transit_time(4)).is_none());
    assert_eq!(scenario.matrix_ids(), [MatrixId(10), MatrixId(11)]);
    assert_eq!(
        scenario.deletions(),
        [
            TemporaryResource::Function(FunctionId::transit_time(4)),
            TemporaryResource::Function(FunctionId::transit_time(3)),
            TemporaryResource::Matrix(MatrixId(3)),
            TemporaryResource::Matrix(MatrixId(2)),
            TemporaryResource::Matrix(MatrixId(1)),
        ]
    );
}

#[test]
fn release_failures_never_mask_the_solver_error() {
    let scenario = scenario();
    scenario.fail_matrix_deletes(true);
    let solver = RecordingSolver::failing_on("A");
    let params = params(vec![class("A", "mf10")]);

    let error = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap_err();

    assert!(matches!(error, Error::Solver { ref class, .. } if class == "A"));
    assert_eq!(scenario.segment_functions(), [1, 1, 2]);
    assert!(scenario.function(FunctionId::transit_time(3)).is_none());
}

#[test]
fn release_failures_do_not_fail_a_completed_run() {
    let scenario = scenario();
    scenario.fail_matrix_deletes(true);
    let solver = RecordingSolver::new();
    let params = params(vec![class("A", "mf10")]);

    let report = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();
    assert_eq!(report.released_temporaries, 0);
}

#[test]
fn node_logit_choice_publishes_choice_points() {
    let scenario = scenario();
    let solver = RecordingSolver::new();
    let params = params_with(vec![class("X", "mf10")], |document| {
        document["node_logit_scale"] = json!(0.6);
        document["congested_assignment"] = json!(true);
    });

    let report = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();

    assert_eq!(report.choice_points, Some(5));
    let network = scenario.network();
    for number in [101, 102, 103, 100_001, 100_002] {
        assert_eq!(network.nodes[&number].choice_marker, -1.0, "node {number}");
    }
    assert_eq!(network.nodes[&1].choice_marker, 0.0);

    let call = &solver.calls()[0];
    assert_eq!(call.kind, AssignmentKind::Congested);
    let choices = &call
        .specification
        .flow_distribution_at_regular_nodes_with_aux_transit_choices
        .choices_at_regular_nodes;
    assert!(matches!(
        choices,
        NodeChoices::Logit { choice_points, logit_parameters }
            if choice_points == "ui1" && logit_parameters.scale == 0.6
    ));
}

/// Captures what the solver sees of the scenario at assignment time.
#[derive(Default)]
struct SnapshotSolver {
    segment_functions: RefCell<Vec<Vec<u32>>>,
    access_walk_perceptions: RefCell<Vec<f64>>,
}

impl TransitSolver<MemoryScenario> for SnapshotSolver {
    fn assign(
        &self,
        scenario: &MemoryScenario,
        _specification: &AssignmentSpecification,
        _invocation: &Invocation<'_>,
    ) -> Result<(), transit_assign::error::SolverError> {
        self.segment_functions
            .borrow_mut()
            .push(scenario.segment_functions());
        let network = scenario.network();
        if let Some(access) = network.links.iter().find(|link| (link.i, link.j) == (1, 101)) {
            self.access_walk_perceptions
                .borrow_mut()
                .push(access.attributes["@walkp"]);
        }
        Ok(())
    }

    fn matrix_results(
        &self,
        _scenario: &MemoryScenario,
        _specification: &transit_assign::MatrixResultsSpecification,
        _class_name: &str,
    ) -> Result<(), transit_assign::error::SolverError> {
        Ok(())
    }
}

#[test]
fn segments_use_remapped_functions_only_while_assigning() {
    let scenario = scenario();
    let solver = SnapshotSolver::default();
    let params = params(vec![class("X", "mf10"), class("Y", "mf11")]);

    TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();

    assert_eq!(*solver.segment_functions.borrow(), [vec![3, 3, 4], vec![3, 3, 4]]);
    assert_eq!(scenario.segment_functions(), [1, 1, 2]);
}

#[test]
fn without_surface_transit_speed_segments_keep_their_functions() {
    let scenario = scenario();
    let solver = SnapshotSolver::default();
    let params = params_with(vec![class("X", "mf10")], |document| {
        document["surface_transit_speed"] = json!(false);
    });

    let report = TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();

    assert_eq!(report.remapped_functions.len(), 2);
    assert_eq!(*solver.segment_functions.borrow(), [vec![1, 1, 2]]);
}

#[test]
fn classes_sharing_a_walk_attribute_keep_earlier_overrides() {
    let scenario = scenario();
    let solver = SnapshotSolver::default();
    let mut with_override = class("X", "mf10");
    with_override["walk_perceptions"] = json!([{"filter": "i=1", "walk_perception_value": 1.8}]);
    let mut without_override = class("Y", "mf11");
    without_override["walk_perceptions"] = json!([]);
    let params = params(vec![with_override, without_override]);

    TransitAssignment::new(&scenario, &solver, &params)
        .run()
        .unwrap();

    assert_eq!(*solver.access_walk_perceptions.borrow(), [1.8, 1.8]);
}
