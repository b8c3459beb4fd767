//! Scoped ownership of run-local matrices, attributes and functions
//!
//! Everything a [`TemporaryScope`] creates is released in reverse creation
//! order when the scope is released or dropped, whichever comes first.
//! Resources named by the caller are initialised but never registered: they
//! belong to the user and outlive the run.

use std::ops::RangeInclusive;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::scenario::{ElementType, FunctionId, MatrixId, Scenario};

/// Prefix of generated temporary attribute names.
const TEMP_ATTRIBUTE_PREFIX: &str = "@tmp";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemporaryResource {
    Matrix(MatrixId),
    Attribute(String),
    Function(FunctionId),
}

impl TemporaryResource {
    fn release<S: Scenario + ?Sized>(&self, scenario: &S) -> std::result::Result<(), EngineError> {
        match self {
            TemporaryResource::Matrix(id) => scenario.delete_matrix(*id),
            TemporaryResource::Attribute(name) => scenario.delete_extra_attribute(name),
            TemporaryResource::Function(id) => scenario.delete_function(*id),
        }
    }
}

pub struct TemporaryScope<'s, S: Scenario + ?Sized> {
    scenario: &'s S,
    resources: Vec<TemporaryResource>,
}

impl<'s, S: Scenario + ?Sized> TemporaryScope<'s, S> {
    pub fn new(scenario: &'s S) -> Self {
        Self {
            scenario,
            resources: Vec::new(),
        }
    }

    /// Resources currently owned by the scope, oldest first.
    pub fn resources(&self) -> &[TemporaryResource] {
        &self.resources
    }

    /// Returns a full matrix initialised to `value`.
    ///
    /// The sentinel id allocates a temporary; a real id is created or reset in
    /// place and left to the user.
    pub fn matrix(&mut self, requested: MatrixId, description: &str, value: f64) -> Result<MatrixId> {
        if !requested.is_none() {
            self.scenario.initialize_matrix(requested, description, value)?;
            return Ok(requested);
        }

        let id = self
            .scenario
            .available_matrix_id()
            .ok_or_else(|| EngineError::new("no free full matrix id"))?;
        self.scenario.initialize_matrix(id, description, value)?;
        debug!(matrix = %id, description, "created temporary matrix");
        self.resources.push(TemporaryResource::Matrix(id));
        Ok(id)
    }

    /// Returns an extra attribute initialised to `default`.
    ///
    /// An existing named attribute is reset; a missing named attribute, or no
    /// name at all, is created and registered as temporary.
    pub fn attribute(
        &mut self,
        element: ElementType,
        requested: Option<&str>,
        default: f64,
    ) -> Result<String> {
        if let Some(name) = requested {
            if self.scenario.extra_attribute(name).is_some() {
                self.scenario.initialize_extra_attribute(name, default)?;
                return Ok(name.to_string());
            }
        }

        let name = match requested {
            Some(name) => name.to_string(),
            None => self.unused_attribute_name(),
        };
        self.scenario.create_extra_attribute(element, &name, default)?;
        debug!(attribute = %name, %element, "created temporary attribute");
        self.resources.push(TemporaryResource::Attribute(name.clone()));
        Ok(name)
    }

    /// Defines `expression` under the first unused transit time function id
    /// in `namespace`.
    pub fn function(
        &mut self,
        namespace: RangeInclusive<u32>,
        expression: &str,
    ) -> Result<Option<FunctionId>> {
        let Some(id) = namespace
            .map(FunctionId::transit_time)
            .find(|id| self.scenario.function(*id).is_none())
        else {
            return Ok(None);
        };
        self.scenario.create_function(id, expression)?;
        debug!(function = %id, expression, "created temporary function");
        self.resources.push(TemporaryResource::Function(id));
        Ok(Some(id))
    }

    fn unused_attribute_name(&self) -> String {
        (1..)
            .map(|n| format!("{TEMP_ATTRIBUTE_PREFIX}{n}"))
            .find(|name| self.scenario.extra_attribute(name).is_none())
            .unwrap_or_else(|| TEMP_ATTRIBUTE_PREFIX.to_string())
    }

    /// Releases every registered resource, newest first. Returns how many
    /// were released; failures are logged and skipped.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        while let Some(resource) = self.resources.pop() {
            match resource.release(self.scenario) {
                Ok(()) => {
                    debug!(?resource, "released temporary");
                    released += 1;
                }
                Err(error) => warn!(?resource, %error, "failed to release temporary"),
            }
        }
        released
    }
}

impl<S: Scenario + ?Sized> Drop for TemporaryScope<'_, S> {
    fn drop(&mut self) {
        self.release_all();
    }
}
