use std::collections::{BTreeMap, HashMap};

use smallvec::SmallVec;

use crate::scenario::{ElementType, ModeId};

/// Node numbers above this are reserved for agency nodes.
pub const AGENCY_NODE_THRESHOLD: u32 = 99_999;

pub type LinkModes = SmallVec<[ModeId; 4]>;
type LinkIndices = SmallVec<[usize; 4]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    Auto,
    Transit,
    AuxTransit,
    AuxAuto,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mode {
    pub id: ModeId,
    pub kind: ModeKind,
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub number: u32,
    pub is_centroid: bool,
    /// Choice-point marker, stored by the engine as `ui1`.
    pub choice_marker: f64,
    pub attributes: BTreeMap<String, f64>,
}

impl Node {
    pub fn regular(number: u32) -> Self {
        Self {
            number,
            is_centroid: false,
            choice_marker: 0.0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn centroid(number: u32) -> Self {
        Self {
            is_centroid: true,
            ..Self::regular(number)
        }
    }

    pub fn is_agency(&self) -> bool {
        self.number > AGENCY_NODE_THRESHOLD
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub i: u32,
    pub j: u32,
    pub length: f64,
    pub modes: LinkModes,
    pub attributes: BTreeMap<String, f64>,
}

impl Link {
    pub fn new(i: u32, j: u32, length: f64, modes: &[ModeId]) -> Self {
        Self {
            i,
            j,
            length,
            modes: modes.iter().copied().collect(),
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitLine {
    pub id: String,
    pub mode: ModeId,
    /// Scheduled headway in minutes.
    pub headway: f64,
    pub speed: f64,
    pub attributes: BTreeMap<String, f64>,
}

impl TransitLine {
    pub fn new(id: impl Into<String>, mode: ModeId, headway: f64) -> Self {
        Self {
            id: id.into(),
            mode,
            headway,
            speed: 0.0,
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitSegment {
    pub line: String,
    pub i: u32,
    pub j: u32,
    pub transit_time_function: u32,
    pub volume: f64,
    pub attributes: BTreeMap<String, f64>,
}

/// Detached snapshot of a scenario's network.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Network {
    pub modes: Vec<Mode>,
    pub nodes: BTreeMap<u32, Node>,
    pub links: Vec<Link>,
    pub lines: Vec<TransitLine>,
    pub segments: Vec<TransitSegment>,
}

impl Network {
    pub fn add_mode(&mut self, id: char, kind: ModeKind, speed: f64) {
        self.modes.push(Mode {
            id: ModeId(id),
            kind,
            speed,
        });
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.number, node);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Adds a line along `itinerary`, one segment per consecutive node pair.
    pub fn add_line(&mut self, line: TransitLine, itinerary: &[u32], function: u32) {
        for pair in itinerary.windows(2) {
            self.segments.push(TransitSegment {
                line: line.id.clone(),
                i: pair[0],
                j: pair[1],
                transit_time_function: function,
                volume: 0.0,
                attributes: BTreeMap::new(),
            });
        }
        self.lines.push(line);
    }

    pub fn node(&self, number: u32) -> Option<&Node> {
        self.nodes.get(&number)
    }

    pub fn regular_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| !node.is_centroid)
    }

    /// Indexes links by their end nodes in one pass over the links.
    pub fn adjacency(&self) -> Adjacency<'_> {
        let mut incoming: HashMap<u32, LinkIndices> = HashMap::with_capacity(self.nodes.len());
        let mut outgoing: HashMap<u32, LinkIndices> = HashMap::with_capacity(self.nodes.len());
        for (idx, link) in self.links.iter().enumerate() {
            outgoing.entry(link.i).or_default().push(idx);
            incoming.entry(link.j).or_default().push(idx);
        }
        Adjacency {
            network: self,
            incoming,
            outgoing,
        }
    }

    pub fn transit_modes(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.modes
            .iter()
            .filter(|mode| mode.kind == ModeKind::Transit)
            .map(|mode| mode.id)
    }

    pub fn is_centroid(&self, number: u32) -> bool {
        self.node(number).is_some_and(|node| node.is_centroid)
    }

    /// Number of elements of the given type.
    pub fn element_count(&self, element: ElementType) -> usize {
        match element {
            ElementType::Node => self.nodes.len(),
            ElementType::Link => self.links.len(),
            ElementType::TransitLine => self.lines.len(),
            ElementType::TransitSegment => self.segments.len(),
        }
    }
}

/// Incoming and outgoing links of every node of a [`Network`].
pub struct Adjacency<'n> {
    network: &'n Network,
    incoming: HashMap<u32, LinkIndices>,
    outgoing: HashMap<u32, LinkIndices>,
}

impl<'n> Adjacency<'n> {
    pub fn incoming(&self, node: u32) -> impl Iterator<Item = &'n Link> + '_ {
        self.links(&self.incoming, node)
    }

    pub fn outgoing(&self, node: u32) -> impl Iterator<Item = &'n Link> + '_ {
        self.links(&self.outgoing, node)
    }

    fn links<'a>(
        &'a self,
        index: &'a HashMap<u32, LinkIndices>,
        node: u32,
    ) -> impl Iterator<Item = &'n Link> + 'a {
        let links = &self.network.links;
        index
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |&idx| &links[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_lists_links_by_end_node() {
        let mut network = Network::default();
        network.add_link(Link::new(1, 2, 1.0, &[]));
        network.add_link(Link::new(2, 3, 1.0, &[]));
        network.add_link(Link::new(4, 2, 1.0, &[]));

        let adjacency = network.adjacency();
        let from: Vec<u32> = adjacency.incoming(2).map(|link| link.i).collect();
        let to: Vec<u32> = adjacency.outgoing(2).map(|link| link.j).collect();
        assert_eq!(from, [1, 4]);
        assert_eq!(to, [3]);
        assert_eq!(adjacency.incoming(1).count(), 0);
        assert_eq!(adjacency.outgoing(9).count(), 0);
    }
}
