// src/model.rs
//! Federation data model: membership records, per-Nursery control
//! state, and action descriptors.
//!
//! A `Serialize + Deserialize` struct plus a `HashMap`-backed registry
//! type for membership, matching the shape used for peer registries
//! elsewhere in this codebase's ancestry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Control lifecycle state of one Nursery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NurseryControlState {
    Up,
    Paused,
    Down,
    Kill,
}

impl NurseryControlState {
    /// Parse a state name from a control-endpoint path segment.
    ///
    /// An unrecognized target is not an error here: the caller logs and
    /// ignores it, so parsing returns `None` rather than failing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "paused" => Some(Self::Paused),
            "down" => Some(Self::Down),
            "kill" => Some(Self::Kill),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Paused => "paused",
            Self::Down => "down",
            Self::Kill => "kill",
        }
    }
}

impl std::fmt::Display for NurseryControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub percent_used: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapStats {
    pub total: u64,
    pub used: u64,
    pub percent_used: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadStats {
    #[serde(rename = "1")]
    pub one: f64,
    #[serde(rename = "5")]
    pub five: f64,
    #[serde(rename = "15")]
    pub fifteen: f64,
}

/// One row of the membership map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseryInfo {
    pub name: String,
    pub base_url: String,
    pub port: u16,
    pub state: NurseryControlState,
    pub processes: u32,
    pub cores: u32,
    pub speed_mhz: u64,
    pub memory: MemoryStats,
    pub swap: SwapStats,
    pub load: LoadStats,
}

impl NurseryInfo {
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Name -> NurseryInfo. Exactly one authoritative copy lives on the
/// primary; secondaries hold a cached copy refreshed on every heartbeat
/// round-trip.
pub type NurseryInfoMap = HashMap<String, NurseryInfo>;

/// Per-node control view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseryState {
    pub base_url: String,
    /// "" for a single node, "/all" for federation-wide.
    pub url_modifier: String,
    pub state: NurseryControlState,
    pub processes: u32,
}

pub const FEDERATION_ROW_NAME: &str = "Federation";

/// Name -> NurseryState for every peer, plus a synthetic "Federation" row.
pub type FederationStateMap = HashMap<String, NurseryState>;

/// Build the FederationStateMap from a membership map and this node's
/// own control state. The synthesized "Federation" row's Processes is
/// the sum across all peers.
pub fn build_federation_state_map(
    members: &NurseryInfoMap,
    self_name: &str,
    self_state: NurseryControlState,
) -> FederationStateMap {
    let mut map = FederationStateMap::new();
    let mut total_processes: u32 = 0;

    for (name, info) in members {
        total_processes += info.processes;
        map.insert(
            name.clone(),
            NurseryState {
                base_url: info.base_url.clone(),
                url_modifier: String::new(),
                state: info.state,
                processes: info.processes,
            },
        );
    }

    // Ensure self is represented even before its first heartbeat lands
    // in the membership map.
    map.entry(self_name.to_string()).or_insert_with(|| NurseryState {
        base_url: String::new(),
        url_modifier: String::new(),
        state: self_state,
        processes: 0,
    });

    map.insert(
        FEDERATION_ROW_NAME.to_string(),
        NurseryState {
            base_url: String::new(),
            url_modifier: "/all".to_string(),
            state: self_state,
            processes: total_processes,
        },
    );

    map
}

/// One {Key, Desc} pair in an action's Args/Envs list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub key: String,
    pub desc: String,
}

/// One {Key, Value} pair in a submitted ActionConfig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgValue {
    pub key: String,
    pub value: String,
}

/// Catalog entry loaded from an on-disk `*.config` descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescription {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub envs: Vec<ArgSpec>,
}

impl ActionDescription {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

pub type ActionList = HashMap<String, ActionDescription>;

/// The runtime binding a user submits to run an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub args: Vec<ArgValue>,
    #[serde(default)]
    pub envs: Vec<ArgValue>,
}

impl ActionConfig {
    /// Flatten Args into `Key Value Key Value …` argv tokens.
    pub fn argv(&self) -> Vec<String> {
        self.args
            .iter()
            .flat_map(|kv| [kv.key.clone(), kv.value.clone()])
            .collect()
    }

    /// Flatten Envs the same way, as (Key, Value) pairs for env vars.
    pub fn envp(&self) -> Vec<(String, String)> {
        self.envs
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_state_roundtrip_through_json() {
        let info = NurseryInfo {
            name: "b".into(),
            base_url: "https://b:8989".into(),
            port: 8989,
            state: NurseryControlState::Up,
            processes: 2,
            cores: 4,
            speed_mhz: 3000,
            memory: MemoryStats::default(),
            swap: SwapStats::default(),
            load: LoadStats::default(),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: NurseryInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, info.name);
        assert_eq!(back.state, NurseryControlState::Up);
    }

    #[test]
    fn unrecognized_state_parses_to_none() {
        assert_eq!(NurseryControlState::parse("sleeping"), None);
        assert_eq!(NurseryControlState::parse("kill"), Some(NurseryControlState::Kill));
    }

    #[test]
    fn federation_row_sums_processes() {
        let mut members = NurseryInfoMap::new();
        for (name, procs) in [("a", 2u32), ("b", 5), ("c", 0)] {
            members.insert(
                name.to_string(),
                NurseryInfo {
                    name: name.to_string(),
                    base_url: format!("https://{name}"),
                    port: 8989,
                    state: NurseryControlState::Up,
                    processes: procs,
                    cores: 1,
                    speed_mhz: 1,
                    memory: MemoryStats::default(),
                    swap: SwapStats::default(),
                    load: LoadStats::default(),
                },
            );
        }
        let map = build_federation_state_map(&members, "a", NurseryControlState::Up);
        let fed = &map[FEDERATION_ROW_NAME];
        assert_eq!(fed.processes, 7);
        assert_eq!(fed.url_modifier, "/all");
    }

    #[test]
    fn action_config_flattens_to_argv() {
        let cfg = ActionConfig {
            args: vec![
                ArgValue { key: "--font".into(), value: "Garamond".into() },
                ArgValue { key: "--size".into(), value: "11".into() },
            ],
            envs: vec![],
        };
        assert_eq!(cfg.argv(), vec!["--font", "Garamond", "--size", "11"]);
    }
}
