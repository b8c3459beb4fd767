use std::collections::BTreeMap;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::scenario::ModeId;

/// Boarding state of a traveller's path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JourneyState {
    Walking,
    Transit,
}

impl JourneyState {
    pub const ALL: [JourneyState; 2] = [JourneyState::Walking, JourneyState::Transit];

    pub fn index(self) -> usize {
        match self {
            JourneyState::Walking => 0,
            JourneyState::Transit => 1,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            JourneyState::Walking => "Walking",
            JourneyState::Transit => "Transit",
        }
    }
}

/// Two-state journey-level machine: paths start in [`JourneyState::Walking`]
/// and move to [`JourneyState::Transit`] on their first boarding of a
/// permitted mode.
#[derive(Clone, Debug, PartialEq)]
pub struct JourneyLevels {
    transitions: BTreeMap<ModeId, JourneyState>,
    walk_all_way: bool,
}

impl JourneyLevels {
    pub fn new(modes: impl IntoIterator<Item = ModeId>, walk_all_way: bool) -> Self {
        Self {
            transitions: modes
                .into_iter()
                .map(|mode| (mode, JourneyState::Transit))
                .collect(),
            walk_all_way,
        }
    }

    /// State after boarding `mode` from `from`, or `None` if boarding is not
    /// permitted.
    pub fn board(&self, from: JourneyState, mode: ModeId) -> Option<JourneyState> {
        // levels never move back towards Walking
        self.transitions.get(&mode).map(|&next| next.max(from))
    }

    pub fn destinations_reachable(&self, state: JourneyState) -> bool {
        match state {
            JourneyState::Walking => self.walk_all_way,
            JourneyState::Transit => true,
        }
    }

    pub fn modes(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.transitions.keys().copied()
    }
}

#[derive(Serialize)]
struct TransitionRule {
    mode: ModeId,
    next_journey_level: usize,
}

#[derive(Serialize)]
struct LevelDocument<'a> {
    description: &'static str,
    destinations_reachable: bool,
    transition_rules: &'a [TransitionRule],
    boarding_time: Option<()>,
    boarding_cost: Option<()>,
    waiting_time: Option<()>,
}

impl Serialize for JourneyLevels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rules: Vec<TransitionRule> = self
            .transitions
            .iter()
            .map(|(&mode, state)| TransitionRule {
                mode,
                next_journey_level: state.index(),
            })
            .collect();

        let mut levels = serializer.serialize_seq(Some(JourneyState::ALL.len()))?;
        for state in JourneyState::ALL {
            levels.serialize_element(&LevelDocument {
                description: state.description(),
                destinations_reachable: self.destinations_reachable(state),
                transition_rules: &rules,
                boarding_time: None,
                boarding_cost: None,
                waiting_time: None,
            })?;
        }
        levels.end()
    }
}
