//! Marks logit choice points on the network
//!
//! A marker of -1 on a regular node makes the solver spread flow over
//! efficient connectors only, i.e. those that bring travellers closer to
//! their destination.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::Result;
use crate::network::Network;
use crate::scenario::Scenario;

pub const EFFICIENT_CONNECTOR_CHOICE: f64 = -1.0;

/// Recomputes every regular node's choice marker. Returns the number of nodes
/// marked as choice points.
pub fn mark_choice_points(network: &mut Network) -> usize {
    // Phase 1: reset every regular node
    for node in network.nodes.values_mut() {
        if !node.is_centroid {
            node.choice_marker = 0.0;
        }
    }

    // Phase 2: decide markers from the untouched topology
    let topology: &Network = network;
    let adjacency = topology.adjacency();
    let mut marked = BTreeSet::new();
    for node in topology.regular_nodes() {
        if node.is_agency() {
            continue;
        }
        let number = node.number;

        let touches_centroid = adjacency
            .incoming(number)
            .any(|link| topology.is_centroid(link.i))
            || adjacency
                .outgoing(number)
                .any(|link| topology.is_centroid(link.j));
        if touches_centroid {
            marked.insert(number);
        }

        let agencies: BTreeSet<u32> = adjacency
            .incoming(number)
            .map(|link| link.i)
            .filter(|&i| is_agency(topology, i))
            .collect();
        if agencies.len() > 1 {
            marked.insert(number);
            let neighbours = adjacency
                .incoming(number)
                .map(|link| link.i)
                .chain(adjacency.outgoing(number).map(|link| link.j))
                .filter(|&other| is_agency(topology, other));
            marked.extend(neighbours);
        }
    }

    // Phase 3: write the markers back
    for number in &marked {
        if let Some(node) = network.nodes.get_mut(number) {
            node.choice_marker = EFFICIENT_CONNECTOR_CHOICE;
        }
    }
    marked.len()
}

fn is_agency(network: &Network, number: u32) -> bool {
    network
        .node(number)
        .is_some_and(|node| !node.is_centroid && node.is_agency())
}

/// Marks choice points on a full copy of the scenario network and publishes
/// it in place of the stored one.
pub fn publish_efficient_connector_network<S: Scenario + ?Sized>(scenario: &S) -> Result<usize> {
    let mut network = scenario.network();
    let marked = mark_choice_points(&mut network);
    scenario.publish_network(network)?;
    info!(marked, "published efficient connector network");
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Link, Node};
    use crate::scenario::ModeId;

    fn link(i: u32, j: u32) -> Link {
        Link::new(i, j, 0.1, &[ModeId('w')])
    }

    fn marker(network: &Network, number: u32) -> f64 {
        network.node(number).unwrap().choice_marker
    }

    #[test]
    fn nodes_next_to_centroids_become_choice_points() {
        let mut network = Network::default();
        network.add_node(Node::centroid(1));
        for number in [10, 11, 12] {
            network.add_node(Node::regular(number));
        }
        network.nodes.get_mut(&12).unwrap().choice_marker = 5.0;
        network.add_link(link(1, 10));
        network.add_link(link(11, 1));
        network.add_link(link(10, 12));

        assert_eq!(mark_choice_points(&mut network), 2);
        assert_eq!(marker(&network, 10), -1.0);
        assert_eq!(marker(&network, 11), -1.0);
        assert_eq!(marker(&network, 12), 0.0);
    }

    #[test]
    fn agency_transfers_mark_the_node_and_its_agency_neighbours() {
        let mut network = Network::default();
        for number in [20, 21, 100_001, 100_002, 100_003] {
            network.add_node(Node::regular(number));
        }
        network.add_link(link(100_001, 20));
        network.add_link(link(100_002, 20));
        network.add_link(link(20, 100_003));
        // a single agency does not make a choice point
        network.add_link(link(100_001, 21));
        network.add_link(link(100_001, 21));

        mark_choice_points(&mut network);
        assert_eq!(marker(&network, 20), -1.0);
        assert_eq!(marker(&network, 21), 0.0);
        for agency in [100_001, 100_002, 100_003] {
            assert_eq!(marker(&network, agency), -1.0);
        }
    }

    #[test]
    fn long_corridors_are_marked_in_one_pass() {
        let mut network = Network::default();
        network.add_node(Node::centroid(1));
        let last = 50_000;
        for number in 10..=last {
            network.add_node(Node::regular(number));
        }
        for number in 10..last {
            network.add_link(link(number, number + 1));
            network.add_link(link(number + 1, number));
        }
        network.add_link(link(1, 10));
        network.add_link(link(last, 1));

        assert_eq!(mark_choice_points(&mut network), 2);
        assert_eq!(marker(&network, 10), -1.0);
        assert_eq!(marker(&network, last), -1.0);
        assert_eq!(marker(&network, 25_000), 0.0);
    }

    #[test]
    fn agency_nodes_are_not_evaluated_themselves() {
        let mut network = Network::default();
        network.add_node(Node::centroid(1));
        network.add_node(Node::regular(100_005));
        network.add_link(link(1, 100_005));

        assert_eq!(mark_choice_points(&mut network), 0);
        assert_eq!(marker(&network, 100_005), 0.0);
    }
}
