// Usage: cargo run --example gtfs-network <path_to_zip> [parameters.json]
//
// Imports a GTFS feed as a transit network and runs an assignment over it.
// Without a parameter document a single all-mode class with empty demand is
// assigned, which exercises the whole pipeline against the imported lines.

use std::{env, time::Instant};

use gtfs_structures::Gtfs;
use humantime::format_duration;
use tracing_subscriber::EnvFilter;
use transit_assign::gtfs::{DEFAULT_TRANSIT_TIME_FUNCTION, network_from_gtfs};
use transit_assign::memory::{MemoryScenario, RecordingSolver};
use transit_assign::network::ModeKind;
use transit_assign::{
    AssignmentParameters, ElementType, FunctionId, Scenario, TransitAssignment,
};

const DEFAULT_PARAMETERS: &str = r#"{
    "scenario_number": 1,
    "walk_speed": 4.8,
    "transit_classes": [{
        "name": "all",
        "mode": "*",
        "demand_matrix": "mf0",
        "impedance_matrix": "mf0",
        "board_penalty_perception": 1.0,
        "fare_perception": 0.0,
        "wait_time_perception": 2.0,
        "walk_time_perception_attribute": "@walkp",
        "segment_fare_attribute": "@sfare",
        "link_fare_attribute_id": "@lfare"
    }],
    "effective_headway_attribute": "@ehdw",
    "effective_headway_slope": 0.165,
    "headway_fraction_attribute": "@frac",
    "node_logit_scale": false,
    "origin_distribution_logit_scale": 0.2
}"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if !(2..=3).contains(&args.len()) {
        eprintln!("Usage: {} <path_to_zip> [parameters.json]", args[0]);
        std::process::exit(1);
    }

    let params = match args.get(2) {
        Some(path) => AssignmentParameters::from_path(path)?,
        None => AssignmentParameters::from_json(DEFAULT_PARAMETERS)?,
    };

    // Load GTFS
    let started = Instant::now();
    let gtfs = Gtfs::new(&args[1])?;
    let mut network = network_from_gtfs(&gtfs);
    network.add_mode('w', ModeKind::AuxTransit, params.walk_speed);
    println!(
        "Imported {} stops, {} links, {} lines and {} segments in {}",
        network.nodes.len(),
        network.links.len(),
        network.lines.len(),
        network.segments.len(),
        format_duration(started.elapsed())
    );

    let scenario = MemoryScenario::new(params.scenario_number, network);
    let mut required = vec![
        (ElementType::TransitLine, params.effective_headway_attribute.clone()),
        (ElementType::Node, params.headway_fraction_attribute.clone()),
    ];
    for class in &params.transit_classes {
        required.push((ElementType::Link, class.walk_time_perception_attribute.clone()));
        required.push((ElementType::TransitSegment, class.segment_fare_attribute.clone()));
        required.push((ElementType::Link, class.link_fare_attribute_id.clone()));
    }
    for (element, name) in required {
        if scenario.extra_attribute(&name).is_none() {
            scenario.create_extra_attribute(element, &name, 0.0)?;
        }
    }
    scenario.create_function(
        FunctionId::transit_time(DEFAULT_TRANSIT_TIME_FUNCTION),
        "length*60/us1",
    )?;

    let solver = RecordingSolver::new();
    let started = Instant::now();
    let report = TransitAssignment::new(&scenario, &solver, &params).run()?;
    println!(
        "Assigned {:?} in {}",
        report.classes_assigned,
        format_duration(started.elapsed())
    );

    let network = scenario.network();
    let mut headways: Vec<_> = network
        .lines
        .iter()
        .filter_map(|line| {
            let effective = line.attributes.get(&params.effective_headway_attribute)?;
            Some((line.id.as_str(), line.headway, *effective))
        })
        .collect();
    headways.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (line, headway, effective) in headways.iter().take(10) {
        println!("{line}: headway {headway:.1} min, effective {effective:.1} min");
    }

    Ok(())
}
