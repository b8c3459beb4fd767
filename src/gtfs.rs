use std::collections::{BTreeMap, BTreeSet, HashMap};

use gtfs_structures::{Gtfs, RouteType};
use tracing::debug;

use crate::attributes::MAX_HEADWAY;
use crate::network::{Link, ModeKind, Network, Node, TransitLine};
use crate::scenario::ModeId;

/// Transit time function given to every imported segment.
pub const DEFAULT_TRANSIT_TIME_FUNCTION: u32 = 1;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Distinct stop sequence of a route, with the first departure of each trip
/// running it.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub route: String,
    pub mode: ModeId,
    pub stops: Vec<String>,
    pub departures: Vec<u32>,
}

pub fn mode_for(route_type: RouteType) -> ModeId {
    let id = match route_type {
        RouteType::Subway => 'm',
        RouteType::Rail => 'r',
        RouteType::Tramway => 'l',
        RouteType::Ferry => 'f',
        _ => 'b',
    };
    ModeId(id)
}

/// Average interval between departures, in minutes.
pub fn headway_minutes(departures: &[u32]) -> Option<f64> {
    let first = departures.iter().min()?;
    let last = departures.iter().max()?;
    if departures.len() < 2 || first == last {
        return None;
    }
    let span = f64::from(last - first) / 60.0;
    Some(span / (departures.len() - 1) as f64)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(from: StopLocation, to: StopLocation) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

pub fn network_from_gtfs(gtfs: &Gtfs) -> Network {
    // Phase 1: Collect stop locations
    let stops = stop_locations(gtfs);

    // Phase 2: Group trips into patterns
    let patterns = build_patterns(gtfs);

    // Phase 3: Lay out nodes, links, lines and segments
    network_from_patterns(&stops, &patterns)
}

fn stop_locations(gtfs: &Gtfs) -> BTreeMap<String, StopLocation> {
    gtfs.stops
        .iter()
        .filter_map(|(id, stop)| {
            let location = StopLocation {
                latitude: stop.latitude?,
                longitude: stop.longitude?,
            };
            Some((id.clone(), location))
        })
        .collect()
}

fn build_patterns(gtfs: &Gtfs) -> Vec<Pattern> {
    let mut patterns: BTreeMap<(String, Vec<String>), Pattern> = BTreeMap::new();

    for trip in gtfs.trips.values() {
        if trip.stop_times.is_empty() {
            continue;
        }
        let Some(route) = gtfs.routes.get(&trip.route_id) else {
            continue;
        };

        let mut sorted_stop_times: Vec<_> = trip.stop_times.iter().collect();
        sorted_stop_times.sort_by_key(|st| st.stop_sequence);

        let stop_sequence: Vec<String> = sorted_stop_times
            .iter()
            .map(|st| st.stop.id.clone())
            .collect();
        let first_departure = sorted_stop_times
            .first()
            .and_then(|st| st.departure_time.or(st.arrival_time));

        let pattern = patterns
            .entry((trip.route_id.clone(), stop_sequence.clone()))
            .or_insert_with(|| Pattern {
                route: trip.route_id.clone(),
                mode: mode_for(route.route_type),
                stops: stop_sequence,
                departures: Vec::new(),
            });
        pattern.departures.extend(first_departure);
    }

    patterns.into_values().collect()
}

/// Builds the network of a set of patterns.
///
/// Stops are numbered from 1 in id order; stops without a location are
/// dropped from their itineraries. Lines are named `<route>-<n>` with `n`
/// counting the route's patterns. Lines with fewer than two distinct
/// departures get the maximum headway.
pub fn network_from_patterns(
    stops: &BTreeMap<String, StopLocation>,
    patterns: &[Pattern],
) -> Network {
    let mut network = Network::default();

    let numbers: HashMap<&str, u32> = stops
        .keys()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx as u32 + 1))
        .collect();
    let locations: Vec<StopLocation> = stops.values().copied().collect();
    for &number in numbers.values() {
        network.add_node(Node::regular(number));
    }

    let modes: BTreeSet<ModeId> = patterns.iter().map(|pattern| pattern.mode).collect();
    for mode in &modes {
        network.add_mode(mode.0, ModeKind::Transit, 0.0);
    }

    let mut links: BTreeMap<(u32, u32), Link> = BTreeMap::new();
    let mut per_route: HashMap<&str, usize> = HashMap::new();

    for pattern in patterns {
        let itinerary: Vec<u32> = pattern
            .stops
            .iter()
            .filter_map(|stop| numbers.get(stop.as_str()).copied())
            .collect();
        if itinerary.len() < 2 {
            debug!(route = %pattern.route, "skipping pattern with fewer than two located stops");
            continue;
        }

        for pair in itinerary.windows(2) {
            let link = links.entry((pair[0], pair[1])).or_insert_with(|| {
                let from = locations[pair[0] as usize - 1];
                let to = locations[pair[1] as usize - 1];
                Link::new(pair[0], pair[1], haversine_km(from, to), &[])
            });
            if !link.modes.contains(&pattern.mode) {
                link.modes.push(pattern.mode);
            }
        }

        let count = per_route.entry(pattern.route.as_str()).or_insert(0);
        *count += 1;
        let headway = headway_minutes(&pattern.departures).unwrap_or(MAX_HEADWAY);
        let line = TransitLine::new(format!("{}-{}", pattern.route, count), pattern.mode, headway);
        network.add_line(line, &itinerary, DEFAULT_TRANSIT_TIME_FUNCTION);
    }

    network.links = links.into_values().collect();
    network
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(latitude: f64, longitude: f64) -> StopLocation {
        StopLocation {
            latitude,
            longitude,
        }
    }

    fn pattern(route: &str, stops: &[&str], departures: &[u32]) -> Pattern {
        Pattern {
            route: route.into(),
            mode: ModeId('b'),
            stops: stops.iter().map(|s| s.to_string()).collect(),
            departures: departures.to_vec(),
        }
    }

    #[test]
    fn headway_averages_departure_intervals() {
        assert_eq!(headway_minutes(&[8 * 3600, 8 * 3600 + 600, 8 * 3600 + 1200]), Some(10.0));
        assert_eq!(headway_minutes(&[3600, 0]), Some(60.0));
        assert_eq!(headway_minutes(&[3600]), None);
        assert_eq!(headway_minutes(&[3600, 3600]), None);
        assert_eq!(headway_minutes(&[]), None);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let distance = haversine_km(location(0.0, 0.0), location(1.0, 0.0));
        assert!((distance - 111.19).abs() < 0.01);
    }

    #[test]
    fn patterns_become_lines_over_shared_links() {
        let stops = BTreeMap::from([
            ("A".to_string(), location(45.50, -73.57)),
            ("B".to_string(), location(45.51, -73.57)),
            ("C".to_string(), location(45.52, -73.57)),
        ]);
        let mut express = pattern("10", &["A", "C"], &[0]);
        express.mode = ModeId('m');
        let patterns = vec![
            pattern("10", &["A", "B", "C"], &[0, 900, 1800]),
            pattern("10", &["C", "B"], &[300, 1500]),
            express,
        ];

        let network = network_from_patterns(&stops, &patterns);

        assert_eq!(network.nodes.len(), 3);
        assert_eq!(network.links.len(), 4);
        let ids: Vec<_> = network.lines.iter().map(|line| line.id.as_str()).collect();
        assert_eq!(ids, ["10-1", "10-2", "10-3"]);
        assert_eq!(network.lines[0].headway, 15.0);
        assert_eq!(network.lines[1].headway, 20.0);
        assert_eq!(network.lines[2].headway, MAX_HEADWAY);
        assert_eq!(network.segments.len(), 4);
        assert!(
            network
                .segments
                .iter()
                .all(|segment| segment.transit_time_function == DEFAULT_TRANSIT_TIME_FUNCTION)
        );
        let modes: Vec<_> = network.transit_modes().collect();
        assert_eq!(modes, [ModeId('b'), ModeId('m')]);

        let ab = network.links.iter().find(|link| (link.i, link.j) == (1, 2)).unwrap();
        assert!((ab.length - 1.112).abs() < 0.01);
    }

    #[test]
    fn unlocated_stops_are_skipped() {
        let stops = BTreeMap::from([("A".to_string(), location(0.0, 0.0))]);
        let network = network_from_patterns(&stops, &[pattern("1", &["A", "X"], &[0])]);
        assert!(network.lines.is_empty());
        assert!(network.links.is_empty());
    }
}
