//! The fixed stage graph of the delivery pipeline.
//!
//! Five stages in order, each with an optional forward target (the next
//! stage downstream), an optional error target (where rework is sent), and a
//! flag saying whether the stage has a work-in-progress cap.
//!
//! ```text
//!            +-------------------- rework --------------------+
//!            v                                                |
//! Backlog -> InDevelopment -> InTesting -> AwaitingRelease -> LiveInProduction
//!                ^              |              |
//!                +--- rework ---+--------------+
//! ```
//!
//! [`StageMap`] is the dense per-stage container used everywhere else.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the five pipeline stages. Never extended at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Backlog,
    InDevelopment,
    InTesting,
    AwaitingRelease,
    LiveInProduction,
}

impl Stage {
    /// Number of stages.
    pub const COUNT: usize = 5;

    /// All stages, upstream to downstream.
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Backlog,
        Stage::InDevelopment,
        Stage::InTesting,
        Stage::AwaitingRelease,
        Stage::LiveInProduction,
    ];

    /// Position of this stage in [`Stage::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Backlog => "Backlog",
            Stage::InDevelopment => "In Development",
            Stage::InTesting => "In Testing",
            Stage::AwaitingRelease => "Awaiting Release",
            Stage::LiveInProduction => "Live in Production",
        }
    }

    /// snake_case key used in scenario files and reports.
    pub const fn key(self) -> &'static str {
        match self {
            Stage::Backlog => "backlog",
            Stage::InDevelopment => "in_development",
            Stage::InTesting => "in_testing",
            Stage::AwaitingRelease => "awaiting_release",
            Stage::LiveInProduction => "live_in_production",
        }
    }

    /// Static link data for this stage.
    #[inline]
    pub fn link(self) -> &'static StageLink {
        &STAGE_GRAPH[self.index()]
    }

    /// The next stage downstream, if any.
    #[inline]
    pub fn forward_target(self) -> Option<Stage> {
        self.link().forward_target
    }

    /// The stage rework is returned to, if any.
    #[inline]
    pub fn error_target(self) -> Option<Stage> {
        self.link().error_target
    }

    /// Whether this stage has a work-in-progress cap.
    #[inline]
    pub fn is_capacity_constrained(self) -> bool {
        self.link().capacity_constrained
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Stage graph
// ---------------------------------------------------------------------------

/// Forward/backward wiring and WIP flag for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLink {
    pub stage: Stage,
    pub forward_target: Option<Stage>,
    pub error_target: Option<Stage>,
    pub capacity_constrained: bool,
}

/// The pipeline topology, indexed by [`Stage::index`].
pub const STAGE_GRAPH: [StageLink; Stage::COUNT] = [
    StageLink {
        stage: Stage::Backlog,
        forward_target: Some(Stage::InDevelopment),
        error_target: None,
        capacity_constrained: false,
    },
    StageLink {
        stage: Stage::InDevelopment,
        forward_target: Some(Stage::InTesting),
        error_target: None,
        capacity_constrained: true,
    },
    StageLink {
        stage: Stage::InTesting,
        forward_target: Some(Stage::AwaitingRelease),
        error_target: Some(Stage::InDevelopment),
        capacity_constrained: true,
    },
    StageLink {
        stage: Stage::AwaitingRelease,
        forward_target: Some(Stage::LiveInProduction),
        error_target: Some(Stage::InDevelopment),
        capacity_constrained: true,
    },
    StageLink {
        stage: Stage::LiveInProduction,
        forward_target: None,
        error_target: Some(Stage::Backlog),
        capacity_constrained: false,
    },
];

// ---------------------------------------------------------------------------
// StageMap
// ---------------------------------------------------------------------------

/// A value for every stage, stored inline in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StageMap<T>([T; Stage::COUNT]);

impl<T> StageMap<T> {
    /// Build a map by evaluating `f` once per stage, in stage order.
    pub fn from_fn(mut f: impl FnMut(Stage) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Stage::ALL[i])))
    }

    /// Iterate `(stage, &value)` pairs in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &T)> {
        Stage::ALL.into_iter().zip(self.0.iter())
    }

    /// Iterate values in stage order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    /// Iterate values mutably in stage order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }

    /// Apply `f` to every value.
    pub fn map<U>(&self, mut f: impl FnMut(Stage, &T) -> U) -> StageMap<U> {
        StageMap::from_fn(|stage| f(stage, &self.0[stage.index()]))
    }
}

impl<T: Copy> StageMap<T> {
    /// A map with the same value for every stage.
    pub fn splat(value: T) -> Self {
        Self([value; Stage::COUNT])
    }
}

impl<T> Index<Stage> for StageMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, stage: Stage) -> &T {
        &self.0[stage.index()]
    }
}

impl<T> IndexMut<Stage> for StageMap<T> {
    #[inline]
    fn index_mut(&mut self, stage: Stage) -> &mut T {
        &mut self.0[stage.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_is_indexed_by_stage() {
        for stage in Stage::ALL {
            assert_eq!(stage.link().stage, stage);
        }
    }

    #[test]
    fn forward_targets_follow_stage_order() {
        assert_eq!(Stage::Backlog.forward_target(), Some(Stage::InDevelopment));
        assert_eq!(Stage::InDevelopment.forward_target(), Some(Stage::InTesting));
        assert_eq!(Stage::InTesting.forward_target(), Some(Stage::AwaitingRelease));
        assert_eq!(
            Stage::AwaitingRelease.forward_target(),
            Some(Stage::LiveInProduction)
        );
        assert_eq!(Stage::LiveInProduction.forward_target(), None);
    }

    #[test]
    fn error_targets_point_upstream() {
        assert_eq!(Stage::Backlog.error_target(), None);
        assert_eq!(Stage::InDevelopment.error_target(), None);
        assert_eq!(Stage::InTesting.error_target(), Some(Stage::InDevelopment));
        assert_eq!(Stage::AwaitingRelease.error_target(), Some(Stage::InDevelopment));
        assert_eq!(Stage::LiveInProduction.error_target(), Some(Stage::Backlog));

        for stage in Stage::ALL {
            if let Some(target) = stage.error_target() {
                assert!(target < stage, "{stage} sends rework downstream");
            }
        }
    }

    #[test]
    fn only_wip_stages_are_capacity_constrained() {
        let constrained: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|s| s.is_capacity_constrained())
            .collect();
        assert_eq!(
            constrained,
            vec![Stage::InDevelopment, Stage::InTesting, Stage::AwaitingRelease]
        );
    }

    #[test]
    fn stage_map_indexing_and_iteration() {
        let mut map = StageMap::from_fn(|s| s.index() * 10);
        map[Stage::InTesting] = 99;
        assert_eq!(map[Stage::Backlog], 0);
        assert_eq!(map[Stage::InTesting], 99);

        let stages: Vec<Stage> = map.iter().map(|(s, _)| s).collect();
        assert_eq!(stages, Stage::ALL.to_vec());

        let doubled = map.map(|_, v| v * 2);
        assert_eq!(doubled[Stage::LiveInProduction], 80);
    }

    #[test]
    fn keys_and_names_are_unique() {
        let mut keys: Vec<&str> = Stage::ALL.iter().map(|s| s.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), Stage::COUNT);
        assert_eq!(Stage::AwaitingRelease.to_string(), "Awaiting Release");
    }
}
