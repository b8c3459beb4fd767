//! Declarative network calculations
//!
//! A [`NetworkCalculation`] writes `expression` into the `result` attribute
//! of every element picked by its [`Selection`]. Calculations are built as
//! typed values and serialized to the document the network calculator reads.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::EngineError;
use crate::scenario::{ElementType, ModeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    fn is_commutative(self) -> bool {
        matches!(self, Operator::Add | Operator::Mul)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Constant(f64),
    Attribute(String),
    Binary {
        op: Operator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    pub fn constant(value: f64) -> Self {
        Expression::Constant(value)
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Expression::Attribute(name.into())
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => op.precedence(),
            _ => 3,
        }
    }

    pub fn evaluate(&self, values: &dyn ElementValues) -> Result<f64, EngineError> {
        match self {
            Expression::Constant(value) => Ok(*value),
            Expression::Attribute(name) => values
                .value(name)
                .ok_or_else(|| EngineError::new(format!("unknown attribute '{name}'"))),
            Expression::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.evaluate(values)?, rhs.evaluate(values)?);
                Ok(match op {
                    Operator::Add => lhs + rhs,
                    Operator::Sub => lhs - rhs,
                    Operator::Mul => lhs * rhs,
                    Operator::Div => lhs / rhs,
                })
            }
        }
    }

    fn binary(op: Operator, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(value) if *value < 0.0 => write!(f, "({value})"),
            Expression::Constant(value) => write!(f, "{value}"),
            Expression::Attribute(name) => f.write_str(name),
            Expression::Binary { op, lhs, rhs } => {
                let own = op.precedence();
                if lhs.precedence() < own {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                write!(f, "{}", op.symbol())?;
                let wrap_rhs = rhs.precedence() < own
                    || (rhs.precedence() == own && !op.is_commutative());
                if wrap_rhs {
                    write!(f, "({rhs})")
                } else {
                    write!(f, "{rhs}")
                }
            }
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! expression_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expression {
            type Output = Expression;

            fn $method(self, rhs: Expression) -> Expression {
                Expression::binary($op, self, rhs)
            }
        }
    };
}

expression_op!(Add, add, Operator::Add);
expression_op!(Sub, sub, Operator::Sub);
expression_op!(Mul, mul, Operator::Mul);
expression_op!(Div, div, Operator::Div);

/// Attribute values of one network element, as seen by a calculation.
pub trait ElementValues {
    fn value(&self, attribute: &str) -> Option<f64>;

    fn has_mode(&self, mode: ModeId) -> bool {
        let _ = mode;
        false
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    All,
    /// Inclusive range over a numeric attribute, written `attr=low,high`.
    Range {
        attribute: String,
        low: f64,
        high: f64,
    },
    /// Raw selector expression supplied by the user.
    Filter(String),
}

impl Selector {
    pub fn range(attribute: impl Into<String>, low: f64, high: f64) -> Self {
        Selector::Range {
            attribute: attribute.into(),
            low,
            high,
        }
    }

    /// Evaluates the selector against one element.
    ///
    /// Filters understand `all`, `attr=value`, `attr=low,high` and
    /// `mode=<mode chars>` terms joined by `or`.
    pub fn matches(&self, values: &dyn ElementValues) -> Result<bool, EngineError> {
        match self {
            Selector::All => Ok(true),
            Selector::Range {
                attribute,
                low,
                high,
            } => Ok(values
                .value(attribute)
                .is_some_and(|value| (*low..=*high).contains(&value))),
            Selector::Filter(filter) => {
                for term in filter.split(" or ") {
                    if term_matches(term.trim(), values)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn term_matches(term: &str, values: &dyn ElementValues) -> Result<bool, EngineError> {
    if term == "all" {
        return Ok(true);
    }
    let (attribute, bounds) = term
        .split_once('=')
        .ok_or_else(|| EngineError::new(format!("unsupported selector term '{term}'")))?;
    let attribute = attribute.trim();
    if attribute == "mode" {
        return Ok(bounds.trim().chars().any(|c| values.has_mode(ModeId(c))));
    }

    let parse = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| EngineError::new(format!("invalid bound '{text}' in '{term}'")))
    };
    let (low, high) = match bounds.split_once(',') {
        Some((low, high)) => (parse(low)?, parse(high)?),
        None => {
            let value = parse(bounds)?;
            (value, value)
        }
    };
    Ok(values
        .value(attribute)
        .is_some_and(|value| (low..=high).contains(&value)))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str("all"),
            Selector::Range {
                attribute,
                low,
                high,
            } => write!(f, "{attribute}={low},{high}"),
            Selector::Filter(filter) => f.write_str(filter),
        }
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub element: ElementType,
    pub selector: Selector,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkCalculation {
    pub result: String,
    pub expression: Expression,
    pub selection: Selection,
}

impl NetworkCalculation {
    pub fn new(
        result: impl Into<String>,
        expression: Expression,
        element: ElementType,
        selector: Selector,
    ) -> Self {
        Self {
            result: result.into(),
            expression,
            selection: Selection { element, selector },
        }
    }
}

impl Serialize for NetworkCalculation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let selections = BTreeMap::from([(self.selection.element, &self.selection.selector)]);
        let mut doc = serializer.serialize_struct("NetworkCalculation", 5)?;
        doc.serialize_field("result", &self.result)?;
        doc.serialize_field("expression", &self.expression)?;
        doc.serialize_field("aggregation", &None::<()>)?;
        doc.serialize_field("selections", &selections)?;
        doc.serialize_field("type", "NETWORK_CALCULATION")?;
        doc.end()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalculationReport {
    pub num_evaluated: usize,
}
