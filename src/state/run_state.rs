/// Lifecycle states for crawl runs and their targets
use serde::Serialize;
use std::fmt;

/// Represents the current state of one crawl run against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlRunState {
    // ===== Active States =====
    /// Run record exists, nothing has been requested yet
    Created,

    /// Probing the target and retrieving its document
    Fetching,

    /// Classifying the document and persisting its inventory
    Parsing,

    // ===== Terminal States =====
    /// Inventory persisted
    Completed,

    /// Run stopped with an error message; partial resources are kept
    Failed,
}

impl CrawlRunState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the run may still make progress
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// `failed` is reachable from every non-terminal state; from `created`
    /// it records a run whose setup could not be persisted.
    pub fn can_transition_to(&self, next: CrawlRunState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Fetching)
                | (Self::Created, Self::Failed)
                | (Self::Fetching, Self::Parsing)
                | (Self::Fetching, Self::Failed)
                | (Self::Parsing, Self::Completed)
                | (Self::Parsing, Self::Failed)
        )
    }

    /// Converts the run state to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a run state from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "fetching" => Some(Self::Fetching),
            "parsing" => Some(Self::Parsing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all run states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Created,
            Self::Fetching,
            Self::Parsing,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for CrawlRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Lifecycle of a registered target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Active,
    Done,
}

impl TargetStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Done => "done",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
