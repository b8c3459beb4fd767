// Usage: cargo run --example failing-class
//
// The solver aborts on the second of three classes. The run fails with the
// solver's error while every temporary matrix and remapped function is
// released and the segments get their original functions back.

use tracing_subscriber::EnvFilter;
use transit_assign::memory::{MemoryScenario, RecordingSolver};
use transit_assign::network::{Link, ModeKind, Node, TransitLine};
use transit_assign::{
    AssignmentParameters, ElementType, FunctionId, MatrixId, ModeId, Network, Scenario,
    TransitAssignment,
};

fn class(name: &str) -> String {
    format!(
        r#"{{
            "name": "{name}",
            "mode": "*",
            "demand_matrix": "mf10",
            "impedance_matrix": "mf0",
            "board_penalty_perception": 1.0,
            "fare_perception": 0.0,
            "wait_time_perception": 2.0,
            "walk_time_perception_attribute": "@walkp",
            "segment_fare_attribute": "@sfare",
            "link_fare_attribute_id": "@lfare"
        }}"#
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let classes = ["commute", "school", "leisure"].map(class).join(",");
    let params = AssignmentParameters::from_json(&format!(
        r#"{{
            "scenario_number": 2,
            "walk_speed": 4.8,
            "transit_classes": [{classes}],
            "effective_headway_attribute": "@ehdw",
            "effective_headway_slope": 0.165,
            "headway_fraction_attribute": "@frac",
            "node_logit_scale": false,
            "origin_distribution_logit_scale": 0.2,
            "surface_transit_speed": true,
            "ttf_definitions": [{{"ttf": 1}}]
        }}"#
    ))?;

    let mut network = Network::default();
    network.add_mode('b', ModeKind::Transit, 0.0);
    network.add_mode('w', ModeKind::AuxTransit, 4.0);
    network.add_node(Node::centroid(1));
    network.add_node(Node::regular(101));
    network.add_node(Node::regular(102));
    network.add_link(Link::new(1, 101, 0.2, &[ModeId('w')]));
    network.add_link(Link::new(101, 102, 2.0, &[ModeId('b')]));
    network.add_line(TransitLine::new("b1", ModeId('b'), 8.0), &[101, 102], 1);

    let scenario = MemoryScenario::new(params.scenario_number, network);
    for (element, name) in [
        (ElementType::TransitLine, "@ehdw"),
        (ElementType::Node, "@frac"),
        (ElementType::Link, "@walkp"),
        (ElementType::TransitSegment, "@sfare"),
        (ElementType::Link, "@lfare"),
    ] {
        scenario.create_extra_attribute(element, name, 0.0)?;
    }
    scenario.create_function(FunctionId::transit_time(1), "length*60/us1")?;
    scenario.set_matrix_value(MatrixId(10), 1, 102, 50.0);

    let solver = RecordingSolver::failing_on("school");
    let assignment = TransitAssignment::new(&scenario, &solver, &params);
    match assignment.run() {
        Ok(report) => println!("unexpected success: {report:?}"),
        Err(error) => println!("run failed: {error}"),
    }

    println!("state: {:?}", assignment.state());
    println!("progress: {:?}", assignment.progress());
    println!("released: {:?}", scenario.deletions());
    println!("matrices left: {:?}", scenario.matrix_ids());
    println!("segment functions: {:?}", scenario.segment_functions());
    Ok(())
}
