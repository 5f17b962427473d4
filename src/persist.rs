//! Engine state persistence
//!
//! Optional JSON snapshot of the token and position maps. On restart the
//! engine reloads the snapshot and revalidates each position against a
//! fresh price read before monitoring resumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::position::Position;
use crate::token::TokenStatus;

/// Serialized engine state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub tokens: HashMap<String, TokenStatus>,
    pub positions: HashMap<String, Position>,
}

impl EngineSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.positions.is_empty()
    }
}

/// Write a snapshot to disk
pub async fn save<P: AsRef<Path>>(path: P, snapshot: &EngineSnapshot) -> Result<()> {
    let data = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::Persistence(e.to_string()))?;

    tokio::fs::write(path.as_ref(), data)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

    debug!(
        "Saved snapshot: {} tokens, {} positions",
        snapshot.tokens.len(),
        snapshot.positions.len()
    );
    Ok(())
}

/// Load a snapshot from disk; a missing file yields an empty snapshot
pub async fn load<P: AsRef<Path>>(path: P) -> Result<EngineSnapshot> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(EngineSnapshot::default());
    }

    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

    let snapshot: EngineSnapshot =
        serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;

    info!(
        "Loaded snapshot: {} tokens, {} positions",
        snapshot.tokens.len(),
        snapshot.positions.len()
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenSource;

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut snapshot = EngineSnapshot::default();
        let mut status = TokenStatus::discovered("mint_a", TokenSource::PumpFun);
        status.transition(crate::token::TokenState::TradePending).unwrap();
        status.record_fill(1.25, 40.0).unwrap();
        snapshot.tokens.insert("mint_a".into(), status);

        save(&path, &snapshot).await.unwrap();
        let loaded = load(&path).await.unwrap();

        assert_eq!(loaded.tokens.len(), 1);
        let status = &loaded.tokens["mint_a"];
        assert_eq!(status.entry_price, 1.25);
        assert_eq!(status.state, crate::token::TokenState::Swapped);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load(dir.path().join("absent.json")).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(load(&path).await, Err(Error::Persistence(_))));
    }
}
