//! Common types for the BlockStage environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an agent (sprite/robot) on the stage.
///
/// Uses UUID v4 for global uniqueness without coordination; stages with a
/// fixed cast derive ids from the sprite index instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Creates a new random AgentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AgentId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic AgentId from an index (sprite slot, seed).
    pub fn from_index(index: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&index.to_le_bytes());
        bytes[8..16].copy_from_slice(&index.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_is_deterministic() {
        assert_eq!(AgentId::from_index(3), AgentId::from_index(3));
        assert_ne!(AgentId::from_index(3), AgentId::from_index(4));
    }

    #[test]
    fn test_display_is_short() {
        assert_eq!(AgentId::from_index(1).to_string().len(), 8);
    }
}
