//! JSONファイルのスナップショットストア

use anyhow::Context;
use debrief_core::{Snapshot, SnapshotStore};
use std::fs;
use std::path::PathBuf;

/// スナップショットをJSONファイルとして保存・読み込みするストア
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// 指定パスのストアを作成する
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write snapshot to {}", self.path.display()))?;
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Snapshot> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read snapshot from {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&json)?;
        Ok(snapshot)
    }
}
