//! Parameter document of an assignment run

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::scenario::{MatrixId, ModeId};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignmentParameters {
    pub scenario_number: u32,

    /// speed given to every aux-transit mode, in km/h
    pub walk_speed: f64,

    /// assigned in this order; the first class resets network volumes
    pub transit_classes: Vec<TransitClassParameters>,

    /// transit line attribute receiving effective headways
    pub effective_headway_attribute: String,

    pub effective_headway_slope: f64,

    /// node attribute holding the headway fraction
    pub headway_fraction_attribute: String,

    /// `false` in the document disables logit choice at regular nodes
    #[serde(
        default,
        deserialize_with = "deserialize_logit_scale",
        serialize_with = "serialize_logit_scale"
    )]
    pub node_logit_scale: Option<f64>,

    pub origin_distribution_logit_scale: f64,

    #[serde(default = "default_connector_logit_truncation")]
    pub connector_logit_truncation: f64,

    #[serde(default)]
    pub congested_assignment: bool,

    #[serde(default)]
    pub walk_all_way_flag: bool,

    #[serde(default)]
    pub surface_transit_speed: bool,

    #[serde(default)]
    pub ttf_definitions: Vec<TtfDefinition>,

    /// protected transit time functions (exclusive right-of-way)
    #[serde(default)]
    pub xrow_ttf_range: BTreeSet<u32>,

    #[serde(default = "default_true")]
    pub consider_total_impedance: bool,

    #[serde(default = "default_true")]
    pub use_logit_connector_choice: bool,

    /// worker-count hint handed to the solver
    #[serde(default = "default_number_of_processors")]
    pub number_of_processors: usize,
}

impl AssignmentParameters {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransitClassParameters {
    pub name: String,

    pub mode: ModeFilter,

    pub demand_matrix: MatrixId,

    pub impedance_matrix: MatrixId,

    /// keyed by output name, e.g. `in_vehicle_time_matrix`
    #[serde(default)]
    pub output_matrices: BTreeMap<String, MatrixId>,

    pub board_penalty_perception: f64,

    pub fare_perception: f64,

    pub wait_time_perception: f64,

    pub walk_time_perception_attribute: String,

    pub segment_fare_attribute: String,

    pub link_fare_attribute_id: String,

    #[serde(default)]
    pub walk_perceptions: Vec<WalkPerception>,
}

impl TransitClassParameters {
    /// Requested outputs, with the sentinel id meaning "not produced".
    pub fn outputs(&self) -> Result<BTreeMap<OutputMatrix, MatrixId>> {
        self.output_matrices
            .iter()
            .filter(|(_, id)| !id.is_none())
            .map(|(name, &id)| Ok((name.parse::<OutputMatrix>()?, id)))
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WalkPerception {
    /// link selector expression
    pub filter: String,
    #[serde(rename = "walk_perception_value")]
    pub value: f64,
}

impl WalkPerception {
    pub fn new(filter: impl Into<String>, value: f64) -> Self {
        Self {
            filter: filter.into(),
            value,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TtfDefinition {
    pub ttf: u32,
}

/// Transit modes a class may board: `"*"` for every transit mode, otherwise a
/// string of mode characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModeFilter {
    All,
    Modes(SmallVec<[ModeId; 8]>),
}

impl FromStr for ModeFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(ModeFilter::All);
        }
        let modes: SmallVec<[ModeId; 8]> = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(ModeId)
            .collect();
        if modes.is_empty() {
            return Err("a transit class needs at least one mode".to_string());
        }
        Ok(ModeFilter::Modes(modes))
    }
}

impl TryFrom<String> for ModeFilter {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ModeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeFilter::All => f.write_str("*"),
            ModeFilter::Modes(modes) => modes.iter().try_for_each(|mode| write!(f, "{mode}")),
        }
    }
}

impl From<ModeFilter> for String {
    fn from(filter: ModeFilter) -> Self {
        filter.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputMatrix {
    InVehicleTime,
    Congestion,
    WalkTime,
    WaitTime,
    Fare,
    BoardPenalty,
}

impl OutputMatrix {
    pub const ALL: [OutputMatrix; 6] = [
        OutputMatrix::InVehicleTime,
        OutputMatrix::Congestion,
        OutputMatrix::WalkTime,
        OutputMatrix::WaitTime,
        OutputMatrix::Fare,
        OutputMatrix::BoardPenalty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputMatrix::InVehicleTime => "in_vehicle_time_matrix",
            OutputMatrix::Congestion => "congestion_matrix",
            OutputMatrix::WalkTime => "walk_time_matrix",
            OutputMatrix::WaitTime => "wait_time_matrix",
            OutputMatrix::Fare => "fare_matrix",
            OutputMatrix::BoardPenalty => "board_penalty_matrix",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OutputMatrix::InVehicleTime => "Transit in-vehicle travel times",
            OutputMatrix::Congestion => "Transit in-vehicle congestion",
            OutputMatrix::WalkTime => "Transit total walk times",
            OutputMatrix::WaitTime => "Transit total wait times",
            OutputMatrix::Fare => "Transit total fares",
            OutputMatrix::BoardPenalty => "Transit total boarding penalties",
        }
    }
}

impl FromStr for OutputMatrix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OutputMatrix::ALL
            .into_iter()
            .find(|output| output.name() == s)
            .ok_or_else(|| Error::UnknownOutputMatrix(s.to_string()))
    }
}

fn default_connector_logit_truncation() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_number_of_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogitScale {
    Flag(bool),
    Scale(f64),
}

fn deserialize_logit_scale<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    match Option::<LogitScale>::deserialize(deserializer)? {
        None | Some(LogitScale::Flag(false)) => Ok(None),
        Some(LogitScale::Flag(true)) => Err(serde::de::Error::custom(
            "node_logit_scale must be a number or false",
        )),
        Some(LogitScale::Scale(scale)) => Ok(Some(scale)),
    }
}

fn serialize_logit_scale<S: Serializer>(
    scale: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match scale {
        Some(scale) => serializer.serialize_f64(*scale),
        None => serializer.serialize_bool(false),
    }
}
