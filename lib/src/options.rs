//! Shared option types that replace boolean flag parameters in the Rust API.

use serde::{Deserialize, Serialize};

/// Controls what happens when a document that is already loaded is fetched again.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reload {
    /// Replace the graph only if the document content changed.
    #[default]
    IfChanged,
    /// Always replace the graph with the freshly parsed document.
    Always,
}

impl Reload {
    pub fn is_always(self) -> bool {
        matches!(self, Reload::Always)
    }
}

impl From<bool> for Reload {
    fn from(force: bool) -> Self {
        if force {
            Reload::Always
        } else {
            Reload::IfChanged
        }
    }
}

/// The order in which a pattern query visits its patterns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternOrder {
    /// Patterns run in the order they were written.
    #[default]
    Source,
    /// Patterns with the most bound positions run first.
    Selectivity,
}

impl From<bool> for PatternOrder {
    fn from(reorder: bool) -> Self {
        if reorder {
            PatternOrder::Selectivity
        } else {
            PatternOrder::Source
        }
    }
}

impl std::str::FromStr for PatternOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(PatternOrder::Source),
            "selectivity" => Ok(PatternOrder::Selectivity),
            other => Err(format!("unknown pattern order '{other}'")),
        }
    }
}

/// Whether the network may be used.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum NetworkMode {
    #[default]
    Online,
    Offline,
}

impl NetworkMode {
    pub fn is_offline(self) -> bool {
        matches!(self, NetworkMode::Offline)
    }
}

impl From<bool> for NetworkMode {
    fn from(offline: bool) -> Self {
        if offline {
            NetworkMode::Offline
        } else {
            NetworkMode::Online
        }
    }
}
