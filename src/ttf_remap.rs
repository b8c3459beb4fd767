//! Run-scoped remapping of transit time functions for surface transit speed
//! updating.
//!
//! Each remapped function gets a fresh id whose expression follows the line
//! speed (`length*60/us1`). On exit the fresh functions are deleted and any
//! per-segment function assignment changed in the meantime is restored.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

use crate::config::TtfDefinition;
use crate::error::{Error, Result};
use crate::resources::TemporaryScope;
use crate::scenario::{FunctionId, Scenario};

pub const REMAP_NAMESPACE: RangeInclusive<u32> = 1..=99;
pub const SURFACE_TRANSIT_EXPRESSION: &str = "(length*60/us1)";

pub struct TtfRemapScope<'s, S: Scenario + ?Sized> {
    scenario: &'s S,
    functions: TemporaryScope<'s, S>,
    original_segments: Vec<u32>,
    mapping: BTreeMap<u32, u32>,
    protected: BTreeSet<u32>,
}

impl<'s, S: Scenario + ?Sized> TtfRemapScope<'s, S> {
    pub fn open(
        scenario: &'s S,
        definitions: &[TtfDefinition],
        protected: &BTreeSet<u32>,
    ) -> Result<Self> {
        let mut scope = Self {
            scenario,
            functions: TemporaryScope::new(scenario),
            original_segments: scenario.segment_functions(),
            mapping: BTreeMap::new(),
            protected: protected.clone(),
        };

        for definition in definitions {
            let id = scope
                .functions
                .function(REMAP_NAMESPACE, SURFACE_TRANSIT_EXPRESSION)?
                .ok_or(Error::FunctionIdsExhausted(FunctionId::transit_time(
                    definition.ttf,
                )))?;
            scope.mapping.insert(definition.ttf, id.number);
            if scope.protected.contains(&definition.ttf) {
                scope.protected.insert(id.number);
            }
            debug!(from = definition.ttf, to = id.number, "remapped transit time function");
        }
        Ok(scope)
    }

    /// Original function number → remapped function number.
    pub fn mapping(&self) -> &BTreeMap<u32, u32> {
        &self.mapping
    }

    /// Protected function numbers, including remapped ids of protected
    /// functions.
    pub fn protected(&self) -> &BTreeSet<u32> {
        &self.protected
    }

    /// Points every segment using a remapped function at its replacement.
    /// Returns the number of segments changed.
    pub fn apply_to_segments(&self) -> Result<usize> {
        let mut changed = 0;
        let functions: Vec<u32> = self
            .scenario
            .segment_functions()
            .into_iter()
            .map(|function| match self.mapping.get(&function) {
                Some(&remapped) => {
                    changed += 1;
                    remapped
                }
                None => function,
            })
            .collect();
        if changed > 0 {
            self.scenario.set_segment_functions(&functions)?;
            info!(changed, "segments switched to remapped functions");
        }
        Ok(changed)
    }

    fn restore_segments(&self) {
        if self.scenario.segment_functions() == self.original_segments {
            return;
        }
        match self.scenario.set_segment_functions(&self.original_segments) {
            Ok(()) => debug!("restored segment transit time functions"),
            Err(error) => warn!(%error, "failed to restore segment transit time functions"),
        }
    }
}

impl<S: Scenario + ?Sized> Drop for TtfRemapScope<'_, S> {
    fn drop(&mut self) {
        // segments must stop referencing the remapped functions before those go
        self.restore_segments();
        self.functions.release_all();
    }
}
