//! Solver-facing specifications
//!
//! One [`AssignmentSpecification`] is built per transit class and handed to
//! the solver unmodified. The types mirror the option groups of the solver's
//! document format; serializing a specification yields that document.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::config::{AssignmentParameters, ModeFilter, OutputMatrix, TransitClassParameters};
use crate::journey::JourneyLevels;
use crate::scenario::{MatrixId, ModeId};

/// Line attribute holding boarding penalties.
pub const BOARDING_PENALTY_ATTRIBUTE: &str = "ut3";
/// Segment attribute fixing in-vehicle time perception at 1.0.
pub const IN_VEHICLE_PERCEPTION_ATTRIBUTE: &str = "us2";
/// Node attribute holding choice-point markers.
pub const CHOICE_POINT_ATTRIBUTE: &str = "ui1";

/// Converts a cost-per-fare perception into minutes per unit of fare.
pub fn fare_time_perception(fare_perception: f64) -> f64 {
    if fare_perception != 0.0 {
        60.0 / fare_perception
    } else {
        fare_perception
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Factor {
    Value(f64),
    Attribute(String),
}

impl From<f64> for Factor {
    fn from(value: f64) -> Self {
        Factor::Value(value)
    }
}

impl From<&str> for Factor {
    fn from(attribute: &str) -> Self {
        Factor::Attribute(attribute.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitingTime {
    pub headway_fraction: String,
    pub effective_headways: String,
    pub spread_factor: f64,
    pub perception_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Penalty {
    pub penalty: Factor,
    pub perception_factor: Factor,
}

impl Penalty {
    pub fn new(penalty: impl Into<Factor>, perception_factor: impl Into<Factor>) -> Self {
        Self {
            penalty: penalty.into(),
            perception_factor: perception_factor.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Boarding {
    pub at_nodes: Option<Penalty>,
    pub on_lines: Option<Penalty>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Perception {
    pub perception_factor: Factor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OdResults {
    pub total_impedance: MatrixId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDistributionBetweenLines {
    pub consider_total_impedance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogitParameters {
    pub scale: f64,
    pub truncation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginChoices {
    pub choice_points: &'static str,
    pub choice_set: &'static str,
    pub logit_parameters: LogitParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDistributionAtOrigins {
    pub choices_at_origins: OriginChoices,
    pub fixed_proportions_on_connectors: Option<()>,
}

impl FlowDistributionAtOrigins {
    /// Logit choice over every connector at every origin.
    pub fn logit(logit_parameters: LogitParameters) -> Self {
        Self {
            choices_at_origins: OriginChoices {
                choice_points: "ALL_ORIGINS",
                choice_set: "ALL_CONNECTORS",
                logit_parameters,
            },
            fixed_proportions_on_connectors: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeChoices {
    OptimalStrategy,
    Logit {
        choice_points: String,
        logit_parameters: LogitParameters,
    },
}

impl Serialize for NodeChoices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeChoices::OptimalStrategy => serializer.serialize_str("OPTIMAL_STRATEGY"),
            NodeChoices::Logit {
                choice_points,
                logit_parameters,
            } => {
                let mut doc = serializer.serialize_struct("NodeChoices", 3)?;
                doc.serialize_field("choice_points", choice_points)?;
                doc.serialize_field("aux_transit_choice_set", "ALL_POSSIBLE_LINKS")?;
                doc.serialize_field("logit_parameters", logit_parameters)?;
                doc.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDistributionAtRegularNodes {
    pub choices_at_regular_nodes: NodeChoices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSettings {
    pub number_of_processors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentSpecification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(serialize_with = "serialize_modes")]
    pub modes: ModeFilter,
    pub demand: MatrixId,
    pub waiting_time: WaitingTime,
    pub boarding_time: Boarding,
    pub boarding_cost: Boarding,
    pub in_vehicle_time: Perception,
    pub in_vehicle_cost: Penalty,
    pub aux_transit_time: Perception,
    pub aux_transit_cost: Penalty,
    pub connector_to_connector_path_prohibition: Option<()>,
    pub od_results: OdResults,
    pub flow_distribution_between_lines: FlowDistributionBetweenLines,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_distribution_at_origins: Option<FlowDistributionAtOrigins>,
    pub flow_distribution_at_regular_nodes_with_aux_transit_choices: FlowDistributionAtRegularNodes,
    pub journey_levels: JourneyLevels,
    pub performance_settings: PerformanceSettings,
    pub save_strategies: bool,
}

fn serialize_modes<S: Serializer>(modes: &ModeFilter, serializer: S) -> Result<S::Ok, S::Error> {
    match modes {
        ModeFilter::All => serializer.collect_seq(["*"]),
        ModeFilter::Modes(modes) => serializer.collect_seq(modes.iter()),
    }
}

/// Matrices prepared for one class before its assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMatrices {
    pub demand: MatrixId,
    pub impedance: MatrixId,
    pub outputs: BTreeMap<OutputMatrix, MatrixId>,
}

/// Builds per-class specifications for one run.
pub struct AssignmentSpecBuilder<'a> {
    params: &'a AssignmentParameters,
    transit_modes: Vec<ModeId>,
}

impl<'a> AssignmentSpecBuilder<'a> {
    /// `transit_modes` are the network's transit modes, used by classes that
    /// may board any of them.
    pub fn new(params: &'a AssignmentParameters, transit_modes: Vec<ModeId>) -> Self {
        Self {
            params,
            transit_modes,
        }
    }

    fn connector_logit(&self, scale: f64) -> LogitParameters {
        LogitParameters {
            scale,
            truncation: self.params.connector_logit_truncation,
        }
    }

    pub fn build(
        &self,
        class: &TransitClassParameters,
        matrices: &ClassMatrices,
    ) -> AssignmentSpecification {
        let params = self.params;
        let fare_perception = fare_time_perception(class.fare_perception);

        let flow_distribution_at_origins = params
            .use_logit_connector_choice
            .then(|| {
                FlowDistributionAtOrigins::logit(
                    self.connector_logit(params.origin_distribution_logit_scale),
                )
            });

        let choices_at_regular_nodes = match params.node_logit_scale {
            Some(scale) => NodeChoices::Logit {
                choice_points: CHOICE_POINT_ATTRIBUTE.to_string(),
                logit_parameters: self.connector_logit(scale),
            },
            None => NodeChoices::OptimalStrategy,
        };

        // aux modes in an explicit filter never board a line
        let journey_modes: Vec<ModeId> = match &class.mode {
            ModeFilter::All => self.transit_modes.clone(),
            ModeFilter::Modes(modes) => modes
                .iter()
                .copied()
                .filter(|mode| self.transit_modes.contains(mode))
                .collect(),
        };

        AssignmentSpecification {
            kind: "EXTENDED_TRANSIT_ASSIGNMENT",
            modes: class.mode.clone(),
            demand: matrices.demand,
            waiting_time: WaitingTime {
                headway_fraction: params.headway_fraction_attribute.clone(),
                effective_headways: params.effective_headway_attribute.clone(),
                spread_factor: 1.0,
                perception_factor: class.wait_time_perception,
            },
            boarding_time: Boarding {
                at_nodes: None,
                on_lines: Some(Penalty::new(
                    BOARDING_PENALTY_ATTRIBUTE,
                    class.board_penalty_perception,
                )),
            },
            boarding_cost: Boarding {
                at_nodes: Some(Penalty::new(0.0, 1.0)),
                on_lines: None,
            },
            in_vehicle_time: Perception {
                perception_factor: IN_VEHICLE_PERCEPTION_ATTRIBUTE.into(),
            },
            in_vehicle_cost: Penalty::new(class.segment_fare_attribute.as_str(), fare_perception),
            aux_transit_time: Perception {
                perception_factor: class.walk_time_perception_attribute.as_str().into(),
            },
            aux_transit_cost: Penalty::new(class.link_fare_attribute_id.as_str(), fare_perception),
            connector_to_connector_path_prohibition: None,
            od_results: OdResults {
                total_impedance: matrices.impedance,
            },
            flow_distribution_between_lines: FlowDistributionBetweenLines {
                consider_total_impedance: params.consider_total_impedance,
            },
            flow_distribution_at_origins,
            flow_distribution_at_regular_nodes_with_aux_transit_choices:
                FlowDistributionAtRegularNodes {
                    choices_at_regular_nodes,
                },
            journey_levels: JourneyLevels::new(journey_modes, params.walk_all_way_flag),
            performance_settings: PerformanceSettings {
                number_of_processors: params.number_of_processors,
            },
            save_strategies: true,
        }
    }
}

/// Skim matrices the solver extracts from a class's saved strategies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixResultsSpecification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(serialize_with = "serialize_modes")]
    pub modes: ModeFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_in_vehicle_times: Option<MatrixId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_vehicle_congestion: Option<MatrixId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_aux_transit_times: Option<MatrixId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_total_waiting_times: Option<MatrixId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_total_fares: Option<MatrixId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_total_boarding_times: Option<MatrixId>,
}

impl MatrixResultsSpecification {
    /// `None` when the class requests no output matrix.
    pub fn for_class(class: &TransitClassParameters, matrices: &ClassMatrices) -> Option<Self> {
        if matrices.outputs.is_empty() {
            return None;
        }
        let output = |kind: OutputMatrix| matrices.outputs.get(&kind).copied();
        Some(Self {
            kind: "EXTENDED_TRANSIT_MATRIX_RESULTS",
            modes: class.mode.clone(),
            actual_in_vehicle_times: output(OutputMatrix::InVehicleTime),
            in_vehicle_congestion: output(OutputMatrix::Congestion),
            actual_aux_transit_times: output(OutputMatrix::WalkTime),
            actual_total_waiting_times: output(OutputMatrix::WaitTime),
            actual_total_fares: output(OutputMatrix::Fare),
            actual_total_boarding_times: output(OutputMatrix::BoardPenalty),
        })
    }
}
