// Usage: cargo run --example simple
//
// Assigns two demand classes on a three-stop corridor served by a bus and a
// metro line, then prints the run report and the first specification.

use std::time::Instant;

use humantime::format_duration;
use tracing_subscriber::EnvFilter;
use transit_assign::memory::{MemoryScenario, RecordingSolver};
use transit_assign::network::{Link, ModeKind, Node, TransitLine};
use transit_assign::{
    AssignmentParameters, ElementType, FunctionId, MatrixId, ModeId, Network, Scenario,
    TransitAssignment,
};

const PARAMETERS: &str = r#"{
    "scenario_number": 1,
    "walk_speed": 4.8,
    "transit_classes": [
        {
            "name": "peak",
            "mode": "*",
            "demand_matrix": "mf10",
            "impedance_matrix": "mf0",
            "output_matrices": {"in_vehicle_time_matrix": "mf20", "wait_time_matrix": "mf21"},
            "board_penalty_perception": 1.0,
            "fare_perception": 25.0,
            "wait_time_perception": 2.0,
            "walk_time_perception_attribute": "@walkp",
            "segment_fare_attribute": "@sfare",
            "link_fare_attribute_id": "@lfare",
            "walk_perceptions": [{"filter": "i=1,2", "walk_perception_value": 1.8}]
        },
        {
            "name": "metro-only",
            "mode": "m",
            "demand_matrix": "mf11",
            "impedance_matrix": "mf30",
            "board_penalty_perception": 1.0,
            "fare_perception": 0.0,
            "wait_time_perception": 1.5,
            "walk_time_perception_attribute": "@walkp",
            "segment_fare_attribute": "@sfare",
            "link_fare_attribute_id": "@lfare"
        }
    ],
    "effective_headway_attribute": "@ehdw",
    "effective_headway_slope": 0.165,
    "headway_fraction_attribute": "@frac",
    "node_logit_scale": 0.5,
    "origin_distribution_logit_scale": 0.2,
    "surface_transit_speed": true,
    "ttf_definitions": [{"ttf": 1}]
}"#;

fn corridor() -> Network {
    let mut network = Network::default();
    network.add_mode('b', ModeKind::Transit, 0.0);
    network.add_mode('m', ModeKind::Transit, 0.0);
    network.add_mode('w', ModeKind::AuxTransit, 4.0);

    network.add_node(Node::centroid(1));
    network.add_node(Node::centroid(2));
    for number in [101, 102, 103] {
        network.add_node(Node::regular(number));
    }

    let walk = [ModeId('w')];
    network.add_link(Link::new(1, 101, 0.4, &walk));
    network.add_link(Link::new(101, 102, 1.2, &[ModeId('b'), ModeId('m')]));
    network.add_link(Link::new(102, 103, 0.9, &[ModeId('b'), ModeId('m')]));
    network.add_link(Link::new(103, 2, 0.3, &walk));

    network.add_line(TransitLine::new("b10", ModeId('b'), 12.0), &[101, 102, 103], 1);
    network.add_line(TransitLine::new("m1", ModeId('m'), 30.0), &[101, 103], 2);
    network
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let params = AssignmentParameters::from_json(PARAMETERS)?;
    let scenario = MemoryScenario::new(params.scenario_number, corridor());
    for (element, name) in [
        (ElementType::TransitLine, "@ehdw"),
        (ElementType::Node, "@frac"),
        (ElementType::Link, "@walkp"),
        (ElementType::TransitSegment, "@sfare"),
        (ElementType::Link, "@lfare"),
    ] {
        scenario.create_extra_attribute(element, name, 0.0)?;
    }
    scenario.create_function(FunctionId::transit_time(1), "length*60/us1*(1+us3)")?;
    scenario.create_function(FunctionId::transit_time(2), "length*60/40")?;
    scenario.set_matrix_value(MatrixId(10), 1, 2, 120.0);
    scenario.set_matrix_value(MatrixId(11), 1, 2, 40.0);

    let solver = RecordingSolver::new();
    let started = Instant::now();
    let report = TransitAssignment::new(&scenario, &solver, &params).run()?;

    println!("Assignment finished in {}", format_duration(started.elapsed()));
    println!("{report:#?}");
    println!("Segment volumes: {:?}", scenario.segment_volumes());
    if let Some(call) = solver.calls().first() {
        println!("{}", serde_json::to_string_pretty(&call.specification)?);
    }
    Ok(())
}
