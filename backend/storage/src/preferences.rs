use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Key/value store for user preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn all(&self) -> Result<BTreeMap<String, Value>>;
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }

    async fn all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryPreferenceStore::new();
        assert!(store.get("theme").await.unwrap().is_none());

        store.set("theme", json!("dark")).await.unwrap();
        store.set("verbose", json!(true)).await.unwrap();
        assert_eq!(store.get("theme").await.unwrap(), Some(json!("dark")));
        assert_eq!(store.all().await.unwrap().len(), 2);

        assert!(store.delete("theme").await.unwrap());
        assert!(!store.delete("theme").await.unwrap());
        assert_eq!(store.all().await.unwrap().keys().collect::<Vec<_>>(), vec!["verbose"]);
    }
}
