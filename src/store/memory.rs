use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{split_path, tree, DocumentStore, StoreError};

/// Volatile store for offline runs and tests.
pub struct MemoryStore {
    root: Mutex<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        let mut root = self.root.lock().await;
        tree::set_at(&mut root, &segments, value);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        let root = self.root.lock().await;
        Ok(tree::get_at(&root, &segments).cloned())
    }
}
