//! In-memory scenario engine and a recording solver
//!
//! [`MemoryScenario`] keeps the whole network, its extra attributes, matrices
//! and functions in process, which makes the pipeline runnable without an
//! external engine. [`RecordingSolver`] stands in for the equilibrium solver:
//! it records every specification it receives and loads each class's total
//! demand onto every transit segment.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::assignment_spec::{AssignmentSpecification, MatrixResultsSpecification};
use crate::calculation::{CalculationReport, ElementValues, NetworkCalculation};
use crate::error::{EngineError, SolverError};
use crate::network::{Link, Mode, Network, Node, TransitLine, TransitSegment};
use crate::resources::TemporaryResource;
use crate::scenario::{
    ElementType, ExtraAttribute, FunctionDef, FunctionId, MatrixId, MatrixInfo, ModeId, Scenario,
};
use crate::solver::{AssignmentKind, Invocation, TransitSolver};

/// Highest full matrix id the engine hands out.
const MAX_MATRIX_ID: u32 = 99;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Matrix {
    pub description: String,
    /// Value of every cell not in `cells`
    pub fill: f64,
    pub cells: BTreeMap<(u32, u32), f64>,
}

#[derive(Default)]
struct State {
    network: Network,
    attributes: BTreeMap<String, ExtraAttribute>,
    matrices: BTreeMap<MatrixId, Matrix>,
    functions: BTreeMap<FunctionId, String>,
    deletions: Vec<TemporaryResource>,
    fail_matrix_deletes: bool,
}

pub struct MemoryScenario {
    number: u32,
    state: RefCell<State>,
}

impl MemoryScenario {
    pub fn new(number: u32, network: Network) -> Self {
        Self {
            number,
            state: RefCell::new(State {
                network,
                ..State::default()
            }),
        }
    }

    pub fn set_matrix_value(&self, id: MatrixId, origin: u32, destination: u32, value: f64) {
        let mut state = self.state.borrow_mut();
        let matrix = state.matrices.entry(id).or_default();
        matrix.cells.insert((origin, destination), value);
    }

    /// Sum of the explicitly set cells of a matrix.
    pub fn matrix_total(&self, id: MatrixId) -> Option<f64> {
        let state = self.state.borrow();
        state
            .matrices
            .get(&id)
            .map(|matrix| matrix.cells.values().sum())
    }

    pub fn matrix_ids(&self) -> Vec<MatrixId> {
        self.state.borrow().matrices.keys().copied().collect()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.state.borrow().attributes.keys().cloned().collect()
    }

    pub fn segment_volumes(&self) -> Vec<f64> {
        let state = self.state.borrow();
        state.network.segments.iter().map(|segment| segment.volume).collect()
    }

    /// Every temporary deletion performed so far, in order.
    pub fn deletions(&self) -> Vec<TemporaryResource> {
        self.state.borrow().deletions.clone()
    }

    /// Makes matrix deletion fail, to exercise release error paths.
    pub fn fail_matrix_deletes(&self, fail: bool) {
        self.state.borrow_mut().fail_matrix_deletes = fail;
    }

    fn load_segments(&self, volume: f64, add: bool) {
        let mut state = self.state.borrow_mut();
        for segment in &mut state.network.segments {
            segment.volume = if add { segment.volume + volume } else { volume };
        }
    }
}

/// Elements carrying extra attribute values.
trait Attributed: ElementValues {
    fn attributes_mut(&mut self) -> &mut BTreeMap<String, f64>;
}

macro_rules! attributed {
    ($($element:ty),*) => {
        $(impl Attributed for $element {
            fn attributes_mut(&mut self) -> &mut BTreeMap<String, f64> {
                &mut self.attributes
            }
        })*
    };
}

attributed!(Node, Link, TransitLine, TransitSegment);

impl ElementValues for Node {
    fn value(&self, attribute: &str) -> Option<f64> {
        match attribute {
            "i" => Some(self.number as f64),
            "ui1" => Some(self.choice_marker),
            _ => self.attributes.get(attribute).copied(),
        }
    }
}

impl ElementValues for Link {
    fn value(&self, attribute: &str) -> Option<f64> {
        match attribute {
            "i" => Some(self.i as f64),
            "j" => Some(self.j as f64),
            "length" => Some(self.length),
            _ => self.attributes.get(attribute).copied(),
        }
    }

    fn has_mode(&self, mode: ModeId) -> bool {
        self.modes.contains(&mode)
    }
}

impl ElementValues for TransitLine {
    fn value(&self, attribute: &str) -> Option<f64> {
        match attribute {
            "hdw" => Some(self.headway),
            "speed" => Some(self.speed),
            _ => self.attributes.get(attribute).copied(),
        }
    }

    fn has_mode(&self, mode: ModeId) -> bool {
        self.mode == mode
    }
}

impl ElementValues for TransitSegment {
    fn value(&self, attribute: &str) -> Option<f64> {
        match attribute {
            "i" => Some(self.i as f64),
            "j" => Some(self.j as f64),
            "ttf" => Some(self.transit_time_function as f64),
            "voltr" => Some(self.volume),
            _ => self.attributes.get(attribute).copied(),
        }
    }
}

fn calculate<'a, T: Attributed + 'a>(
    elements: impl IntoIterator<Item = &'a mut T>,
    calculation: &NetworkCalculation,
) -> Result<usize, EngineError> {
    let mut evaluated = 0;
    for element in elements {
        if !calculation.selection.selector.matches(&*element)? {
            continue;
        }
        let value = calculation.expression.evaluate(&*element)?;
        element
            .attributes_mut()
            .insert(calculation.result.clone(), value);
        evaluated += 1;
    }
    Ok(evaluated)
}

fn for_each_attribute_map(
    network: &mut Network,
    element: ElementType,
    mut apply: impl FnMut(&mut BTreeMap<String, f64>),
) {
    match element {
        ElementType::Node => network
            .nodes
            .values_mut()
            .for_each(|node| apply(&mut node.attributes)),
        ElementType::Link => network
            .links
            .iter_mut()
            .for_each(|link| apply(&mut link.attributes)),
        ElementType::TransitLine => network
            .lines
            .iter_mut()
            .for_each(|line| apply(&mut line.attributes)),
        ElementType::TransitSegment => network
            .segments
            .iter_mut()
            .for_each(|segment| apply(&mut segment.attributes)),
    }
}

impl Scenario for MemoryScenario {
    fn number(&self) -> u32 {
        self.number
    }

    fn extra_attribute(&self, name: &str) -> Option<ExtraAttribute> {
        self.state.borrow().attributes.get(name).cloned()
    }

    fn create_extra_attribute(
        &self,
        element: ElementType,
        name: &str,
        default: f64,
    ) -> Result<ExtraAttribute, EngineError> {
        let mut state = self.state.borrow_mut();
        if state.attributes.contains_key(name) {
            return Err(EngineError::new(format!("attribute {name} already exists")));
        }
        for_each_attribute_map(&mut state.network, element, |values| {
            values.insert(name.to_string(), default);
        });
        let attribute = ExtraAttribute {
            name: name.to_string(),
            element,
            default,
            description: String::new(),
        };
        state.attributes.insert(name.to_string(), attribute.clone());
        Ok(attribute)
    }

    fn initialize_extra_attribute(&self, name: &str, value: f64) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        let element = state
            .attributes
            .get(name)
            .map(|attribute| attribute.element)
            .ok_or_else(|| EngineError::new(format!("attribute {name} does not exist")))?;
        for_each_attribute_map(&mut state.network, element, |values| {
            values.insert(name.to_string(), value);
        });
        Ok(())
    }

    fn delete_extra_attribute(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        let attribute = state
            .attributes
            .remove(name)
            .ok_or_else(|| EngineError::new(format!("attribute {name} does not exist")))?;
        for_each_attribute_map(&mut state.network, attribute.element, |values| {
            values.remove(name);
        });
        state
            .deletions
            .push(TemporaryResource::Attribute(name.to_string()));
        Ok(())
    }

    fn matrix(&self, id: MatrixId) -> Option<MatrixInfo> {
        let state = self.state.borrow();
        state.matrices.get(&id).map(|matrix| MatrixInfo {
            id,
            description: matrix.description.clone(),
        })
    }

    fn available_matrix_id(&self) -> Option<MatrixId> {
        let state = self.state.borrow();
        (1..=MAX_MATRIX_ID)
            .map(MatrixId)
            .find(|id| !state.matrices.contains_key(id))
    }

    fn initialize_matrix(
        &self,
        id: MatrixId,
        description: &str,
        value: f64,
    ) -> Result<MatrixInfo, EngineError> {
        if id.is_none() || id.0 > MAX_MATRIX_ID {
            return Err(EngineError::new(format!("{id} is not a valid matrix id")));
        }
        let mut state = self.state.borrow_mut();
        let matrix = state.matrices.entry(id).or_default();
        matrix.description = description.to_string();
        matrix.fill = value;
        matrix.cells.clear();
        Ok(MatrixInfo {
            id,
            description: description.to_string(),
        })
    }

    fn delete_matrix(&self, id: MatrixId) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        if state.fail_matrix_deletes {
            return Err(EngineError::new(format!("matrix {id} is locked")));
        }
        state
            .matrices
            .remove(&id)
            .ok_or_else(|| EngineError::new(format!("matrix {id} does not exist")))?;
        state.deletions.push(TemporaryResource::Matrix(id));
        Ok(())
    }

    fn functions(&self) -> Vec<FunctionDef> {
        let state = self.state.borrow();
        state
            .functions
            .iter()
            .map(|(&id, expression)| FunctionDef {
                id,
                expression: expression.clone(),
            })
            .collect()
    }

    fn function(&self, id: FunctionId) -> Option<FunctionDef> {
        let state = self.state.borrow();
        state.functions.get(&id).map(|expression| FunctionDef {
            id,
            expression: expression.clone(),
        })
    }

    fn create_function(&self, id: FunctionId, expression: &str) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        if state.functions.contains_key(&id) {
            return Err(EngineError::new(format!("function {id} already exists")));
        }
        state.functions.insert(id, expression.to_string());
        Ok(())
    }

    fn set_function_expression(
        &self,
        id: FunctionId,
        expression: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        let current = state
            .functions
            .get_mut(&id)
            .ok_or_else(|| EngineError::new(format!("function {id} does not exist")))?;
        *current = expression.to_string();
        Ok(())
    }

    fn delete_function(&self, id: FunctionId) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state
            .functions
            .remove(&id)
            .ok_or_else(|| EngineError::new(format!("function {id} does not exist")))?;
        state.deletions.push(TemporaryResource::Function(id));
        Ok(())
    }

    fn modes(&self) -> Vec<Mode> {
        self.state.borrow().network.modes.clone()
    }

    fn set_mode_speed(&self, mode: ModeId, speed: f64) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        let mode = state
            .network
            .modes
            .iter_mut()
            .find(|candidate| candidate.id == mode)
            .ok_or_else(|| EngineError::new(format!("mode {mode} does not exist")))?;
        mode.speed = speed;
        Ok(())
    }

    fn network(&self) -> Network {
        self.state.borrow().network.clone()
    }

    fn publish_network(&self, network: Network) -> Result<(), EngineError> {
        self.state.borrow_mut().network = network;
        Ok(())
    }

    fn segment_functions(&self) -> Vec<u32> {
        let state = self.state.borrow();
        state
            .network
            .segments
            .iter()
            .map(|segment| segment.transit_time_function)
            .collect()
    }

    fn set_segment_functions(&self, functions: &[u32]) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        if functions.len() != state.network.segments.len() {
            return Err(EngineError::new(format!(
                "expected {} segment functions, got {}",
                state.network.segments.len(),
                functions.len()
            )));
        }
        for (segment, &function) in state.network.segments.iter_mut().zip(functions) {
            segment.transit_time_function = function;
        }
        Ok(())
    }

    fn run_calculation(
        &self,
        calculation: &NetworkCalculation,
    ) -> Result<CalculationReport, EngineError> {
        let mut state = self.state.borrow_mut();
        let element = calculation.selection.element;
        match state.attributes.get(&calculation.result) {
            Some(attribute) if attribute.element == element => {}
            _ => {
                return Err(EngineError::new(format!(
                    "{} is not a {element} extra attribute",
                    calculation.result
                )));
            }
        }

        let network = &mut state.network;
        let num_evaluated = match element {
            ElementType::Node => calculate(network.nodes.values_mut(), calculation)?,
            ElementType::Link => calculate(network.links.iter_mut(), calculation)?,
            ElementType::TransitLine => calculate(network.lines.iter_mut(), calculation)?,
            ElementType::TransitSegment => calculate(network.segments.iter_mut(), calculation)?,
        };
        Ok(CalculationReport { num_evaluated })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolverCall {
    pub class_name: String,
    pub add_volumes: bool,
    pub kind: AssignmentKind,
    pub specification: AssignmentSpecification,
}

#[derive(Default)]
pub struct RecordingSolver {
    fail_on: Option<String>,
    calls: RefCell<Vec<SolverCall>>,
    matrix_results: RefCell<Vec<(String, MatrixResultsSpecification)>>,
}

impl RecordingSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A solver that fails when asked to assign `class_name`.
    pub fn failing_on(class_name: impl Into<String>) -> Self {
        Self {
            fail_on: Some(class_name.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SolverCall> {
        self.calls.borrow().clone()
    }

    pub fn matrix_results(&self) -> Vec<(String, MatrixResultsSpecification)> {
        self.matrix_results.borrow().clone()
    }
}

impl TransitSolver<MemoryScenario> for RecordingSolver {
    fn assign(
        &self,
        scenario: &MemoryScenario,
        specification: &AssignmentSpecification,
        invocation: &Invocation<'_>,
    ) -> Result<(), SolverError> {
        if self.fail_on.as_deref() == Some(invocation.class_name) {
            return Err(format!("solver aborted class {}", invocation.class_name).into());
        }
        let demand = scenario
            .matrix_total(specification.demand)
            .ok_or_else(|| format!("demand matrix {} does not exist", specification.demand))?;
        scenario.load_segments(demand, invocation.add_volumes);

        self.calls.borrow_mut().push(SolverCall {
            class_name: invocation.class_name.to_string(),
            add_volumes: invocation.add_volumes,
            kind: invocation.kind,
            specification: specification.clone(),
        });
        Ok(())
    }

    fn matrix_results(
        &self,
        _scenario: &MemoryScenario,
        specification: &MatrixResultsSpecification,
        class_name: &str,
    ) -> Result<(), SolverError> {
        self.matrix_results
            .borrow_mut()
            .push((class_name.to_string(), specification.clone()));
        Ok(())
    }
}
