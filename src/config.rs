//! Runtime configuration for graph construction and synchronization.

use serde::{Deserialize, Serialize};

/// How owned vertex data is routed to the ranks that hold it as a ghost.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostSyncPolicy {
    /// Every owned vertex with out-degree is sent to every other rank.
    /// Correct for directed input; receivers drop ids they do not hold.
    #[default]
    Broadcast,
    /// A vertex is sent once to each rank owning one of its ghost neighbours.
    /// Requires symmetric adjacency (every edge stored in both directions).
    Neighbors,
}

/// Knobs shared by every pipeline step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Log per-step wall time at `info` level (after a barrier).
    pub verbose: bool,
    /// Log step entry/exit and ghost counts at `debug` level.
    pub debug: bool,
    /// Validate graph invariants after every step.
    pub verify: bool,
    /// Routing rule for ghost attribute synchronization.
    pub ghost_sync: GhostSyncPolicy,
    /// Re-index ghosts in ascending global-id order after discovery.
    pub canonical_ghost_order: bool,
    /// Number of records each worker stages per destination before flushing.
    pub stage_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            debug: false,
            verify: false,
            ghost_sync: GhostSyncPolicy::Broadcast,
            canonical_ghost_order: false,
            stage_capacity: 1024,
        }
    }
}

impl GraphConfig {
    /// A configuration that validates every step; handy in tests.
    pub fn verified() -> Self {
        Self {
            verify: true,
            ..Default::default()
        }
    }

    /// Builder-style override of the ghost routing policy.
    pub fn with_ghost_sync(mut self, policy: GhostSyncPolicy) -> Self {
        self.ghost_sync = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: GraphConfig =
            serde_json::from_str(r#"{"verify":true,"ghost_sync":"neighbors"}"#).unwrap();
        assert!(cfg.verify);
        assert_eq!(cfg.ghost_sync, GhostSyncPolicy::Neighbors);
        assert_eq!(cfg.stage_capacity, 1024);
        assert!(!cfg.canonical_ghost_order);
    }
}
