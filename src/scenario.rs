use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calculation::{CalculationReport, NetworkCalculation};
use crate::error::EngineError;
use crate::network::{Mode, Network};

/// Scenario-scoped matrix identifier, written `mfN`. `mf0` is the sentinel for
/// "not supplied".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatrixId(pub u32);

impl MatrixId {
    pub const NONE: MatrixId = MatrixId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for MatrixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mf{}", self.0)
    }
}

impl FromStr for MatrixId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("mf").unwrap_or(s.trim());
        digits
            .parse()
            .map(MatrixId)
            .map_err(|_| format!("'{s}' is not a full matrix id"))
    }
}

impl TryFrom<String> for MatrixId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatrixId> for String {
    fn from(id: MatrixId) -> Self {
        id.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionKind {
    VolumeDelay,
    TurnDelay,
    TransitTime,
}

impl FunctionKind {
    fn prefix(self) -> &'static str {
        match self {
            FunctionKind::VolumeDelay => "fd",
            FunctionKind::TurnDelay => "fp",
            FunctionKind::TransitTime => "ft",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId {
    pub kind: FunctionKind,
    pub number: u32,
}

impl FunctionId {
    pub fn transit_time(number: u32) -> Self {
        Self {
            kind: FunctionKind::TransitTime,
            number,
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.number)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub id: FunctionId,
    pub expression: String,
}

/// Transit mode identifier (a single character, as in `b`, `m`, `w`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeId(pub char);

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Node,
    Link,
    TransitLine,
    TransitSegment,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Node => "NODE",
            ElementType::Link => "LINK",
            ElementType::TransitLine => "TRANSIT_LINE",
            ElementType::TransitSegment => "TRANSIT_SEGMENT",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtraAttribute {
    pub name: String,
    pub element: ElementType,
    pub default: f64,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatrixInfo {
    pub id: MatrixId,
    pub description: String,
}

/// Handle to the network/matrix store an assignment runs against.
///
/// The store owns the state; every method takes `&self` so that scoped guards
/// can hold the handle while the pipeline keeps using it.
pub trait Scenario {
    fn number(&self) -> u32;

    fn extra_attribute(&self, name: &str) -> Option<ExtraAttribute>;
    fn create_extra_attribute(
        &self,
        element: ElementType,
        name: &str,
        default: f64,
    ) -> Result<ExtraAttribute, EngineError>;
    /// Resets every element's value of the attribute to `value`.
    fn initialize_extra_attribute(&self, name: &str, value: f64) -> Result<(), EngineError>;
    fn delete_extra_attribute(&self, name: &str) -> Result<(), EngineError>;

    fn matrix(&self, id: MatrixId) -> Option<MatrixInfo>;
    fn available_matrix_id(&self) -> Option<MatrixId>;
    /// Creates the matrix if it is absent, then sets every cell to `value`.
    fn initialize_matrix(
        &self,
        id: MatrixId,
        description: &str,
        value: f64,
    ) -> Result<MatrixInfo, EngineError>;
    fn delete_matrix(&self, id: MatrixId) -> Result<(), EngineError>;

    fn functions(&self) -> Vec<FunctionDef>;
    fn function(&self, id: FunctionId) -> Option<FunctionDef>;
    fn create_function(&self, id: FunctionId, expression: &str) -> Result<(), EngineError>;
    fn set_function_expression(&self, id: FunctionId, expression: &str)
    -> Result<(), EngineError>;
    fn delete_function(&self, id: FunctionId) -> Result<(), EngineError>;

    fn modes(&self) -> Vec<Mode>;
    fn set_mode_speed(&self, mode: ModeId, speed: f64) -> Result<(), EngineError>;

    /// Full snapshot of the network, detached from the store.
    fn network(&self) -> Network;
    /// Replaces the stored network with `network`.
    fn publish_network(&self, network: Network) -> Result<(), EngineError>;

    /// Transit time function number of every segment, in segment order.
    fn segment_functions(&self) -> Vec<u32>;
    fn set_segment_functions(&self, functions: &[u32]) -> Result<(), EngineError>;

    fn run_calculation(
        &self,
        calculation: &NetworkCalculation,
    ) -> Result<CalculationReport, EngineError>;
}
