//! Network attributes derived before assignment: effective headways, walk
//! perceptions and walk speed.

use tracing::{debug, info, info_span};

use crate::calculation::{Expression, NetworkCalculation, Selector};
use crate::config::WalkPerception;
use crate::error::Result;
use crate::network::ModeKind;
use crate::scenario::{ElementType, Scenario};

/// Headways up to this many minutes are used as-is.
pub const HEADWAY_BREAKPOINT: f64 = 15.0;
pub const MAX_HEADWAY: f64 = 999.0;

/// The two calculations that write the piecewise effective headway.
///
/// At the breakpoint both pieces yield the scheduled headway, so the shared
/// boundary needs no tie-break.
pub fn effective_headway_calculations(attribute: &str, slope: f64) -> [NetworkCalculation; 2] {
    let headway = || Expression::attribute("hdw");
    let breakpoint = || Expression::constant(HEADWAY_BREAKPOINT);

    let small = NetworkCalculation::new(
        attribute,
        headway(),
        ElementType::TransitLine,
        Selector::range("hdw", 0.0, HEADWAY_BREAKPOINT),
    );
    let large = NetworkCalculation::new(
        attribute,
        breakpoint()
            + Expression::constant(2.0) * Expression::constant(slope) * (headway() - breakpoint()),
        ElementType::TransitLine,
        Selector::range("hdw", HEADWAY_BREAKPOINT, MAX_HEADWAY),
    );
    [small, large]
}

pub fn assign_effective_headway<S: Scenario + ?Sized>(
    scenario: &S,
    attribute: &str,
    slope: f64,
) -> Result<()> {
    for calculation in effective_headway_calculations(attribute, slope) {
        let report = scenario.run_calculation(&calculation)?;
        debug!(
            selector = %calculation.selection.selector,
            evaluated = report.num_evaluated,
            "effective headway calculation"
        );
    }
    Ok(())
}

/// Resets a walk perception attribute to 1.0 on every link.
pub fn reset_walk_perception<S: Scenario + ?Sized>(scenario: &S, attribute: &str) -> Result<()> {
    scenario.initialize_extra_attribute(attribute, 1.0)?;
    Ok(())
}

/// Applies a class's walk perception overrides in order; later overrides win
/// where selectors overlap.
pub fn apply_walk_perceptions<S: Scenario + ?Sized>(
    scenario: &S,
    attribute: &str,
    overrides: &[WalkPerception],
) -> Result<()> {
    let _span = info_span!("walk_perception", attribute).entered();
    for WalkPerception { filter, value } in overrides {
        let calculation = NetworkCalculation::new(
            attribute,
            Expression::constant(*value),
            ElementType::Link,
            Selector::Filter(filter.clone()),
        );
        let report = scenario.run_calculation(&calculation)?;
        debug!(%filter, value, evaluated = report.num_evaluated, "applied walk perception");
    }
    Ok(())
}

/// Sets the speed of every aux-transit mode to `speed`.
pub fn change_walk_speed<S: Scenario + ?Sized>(scenario: &S, speed: f64) -> Result<usize> {
    let mut changed = 0;
    for mode in scenario.modes() {
        if mode.kind != ModeKind::AuxTransit {
            continue;
        }
        scenario.set_mode_speed(mode.id, speed)?;
        info!(mode = %mode.id, speed, "changed walk speed");
        changed += 1;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScenario;
    use crate::network::{Link, Network, Node, TransitLine};
    use crate::scenario::ModeId;

    fn network() -> Network {
        let mut network = Network::default();
        network.add_mode('b', ModeKind::Transit, 0.0);
        network.add_mode('w', ModeKind::AuxTransit, 4.0);
        network.add_mode('t', ModeKind::AuxTransit, 4.0);
        for number in 1..=3 {
            network.add_node(Node::regular(number));
        }
        network.add_link(Link::new(1, 2, 0.5, &[ModeId('w')]));
        network.add_link(Link::new(2, 3, 0.5, &[ModeId('b'), ModeId('w')]));
        for (id, headway) in [
            ("L10", 10.0),
            ("L15", 15.0),
            ("L45", 45.0),
            ("L100", 100.0),
            ("L1200", 1200.0),
        ] {
            network.add_line(TransitLine::new(id, ModeId('b'), headway), &[1, 2, 3], 1);
        }
        network
    }

    #[test]
    fn effective_headway_calculations_write_the_line_attribute() {
        let scenario = MemoryScenario::new(1, network());
        scenario
            .create_extra_attribute(ElementType::TransitLine, "@ehdw", 0.0)
            .unwrap();
        assert_eq!(
            effective_headway_calculations("@ehdw", 0.5)[1]
                .expression
                .to_string(),
            "15+2*0.5*(hdw-15)"
        );

        assign_effective_headway(&scenario, "@ehdw", 0.25).unwrap();
        let network = scenario.network();
        let values: Vec<f64> = network.lines.iter().map(|line| line.attributes["@ehdw"]).collect();
        // headways past the last range keep the initial value
        assert_eq!(values, vec![10.0, 15.0, 30.0, 57.5, 0.0]);
    }

    #[test]
    fn later_walk_perception_overrides_win() {
        let scenario = MemoryScenario::new(1, network());
        scenario
            .create_extra_attribute(ElementType::Link, "@walkp", 0.0)
            .unwrap();
        let overrides = [
            WalkPerception::new("i=2", 2.0),
            WalkPerception::new("i=2", 3.0),
        ];
        reset_walk_perception(&scenario, "@walkp").unwrap();
        apply_walk_perceptions(&scenario, "@walkp", &overrides).unwrap();

        let network = scenario.network();
        assert_eq!(network.links[0].attributes["@walkp"], 1.0);
        assert_eq!(network.links[1].attributes["@walkp"], 3.0);
    }

    #[test]
    fn only_aux_transit_modes_change_speed() {
        let scenario = MemoryScenario::new(1, network());
        assert_eq!(change_walk_speed(&scenario, 5.5).unwrap(), 2);
        let speeds: Vec<f64> = scenario.modes().iter().map(|mode| mode.speed).collect();
        assert_eq!(speeds, vec![0.0, 5.5, 5.5]);
    }
}
