//! Pool of user-agent identities presented to targets

use rand::seq::SliceRandom;
use std::path::Path;
use tracing::{debug, warn};

/// Identity used when no pool file is configured or the file yields nothing
pub const DEFAULT_IDENTITY: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User-agent strings drawn uniformly at random per request
///
/// Loaded once at startup and shared by reference; never empty.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    agents: Vec<String>,
}

impl IdentityPool {
    /// Loads a pool file: one identity per line, blank lines and lines
    /// starting with `#` ignored
    ///
    /// An unreadable or effectively empty file falls back to
    /// [`DEFAULT_IDENTITY`].
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let pool = Self::from_lines(&content);
                debug!(
                    "Loaded {} identities from {}",
                    pool.len(),
                    path.display()
                );
                pool
            }
            Err(e) => {
                warn!(
                    "Identity pool {} unreadable ({}), using default identity",
                    path.display(),
                    e
                );
                Self::fallback()
            }
        }
    }

    /// Parses pool text in the file format
    pub fn from_lines(content: &str) -> Self {
        Self::from_list(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Builds a pool from a fixed list; an empty list yields the fallback
    pub fn from_list(agents: Vec<String>) -> Self {
        if agents.is_empty() {
            return Self::fallback();
        }
        Self { agents }
    }

    /// Pool containing only [`DEFAULT_IDENTITY`]
    pub fn fallback() -> Self {
        Self {
            agents: vec![DEFAULT_IDENTITY.to_string()],
        }
    }

    pub fn choose(&self) -> &str {
        let mut rng = rand::thread_rng();
        self.agents
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_IDENTITY)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::fallback()
    }
}
