//! Orchestration store
//!
//! [`Store`] is the untyped interface to wherever declared resources live.
//! [`Client`] layers typed access on top and turns "before"/"after" snapshots
//! into a single JSON merge patch, so only the fields a reconcile actually
//! changed are written and fields owned by other writers survive.

use crate::meta::{Object, ObjectKey};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    #[error("Conflict writing {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: ObjectKey,
        message: String,
    },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Untyped object store
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Value>;

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Value>>;

    async fn create(&self, kind: &str, key: &ObjectKey, object: Value) -> Result<Value>;

    /// Apply a JSON merge patch (RFC 7386) to the live object
    async fn patch(&self, kind: &str, key: &ObjectKey, patch: Value) -> Result<Value>;

    /// Delete an object; objects holding finalizers are only marked for deletion
    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<()>;
}

/// Typed access to a [`Store`]
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
}

impl Client {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get<K: Object>(&self, key: &ObjectKey) -> Result<K> {
        let value = self.store.get(K::KIND, key).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`get`](Self::get) but a missing object is `None`
    pub async fn find<K: Object>(&self, key: &ObjectKey) -> Result<Option<K>> {
        match self.get(key).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Objects in `namespace` carrying every label of `labels`
    pub async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let mut objects = Vec::new();
        for value in self.store.list(K::KIND, namespace).await? {
            let object: K = serde_json::from_value(value)?;
            let matches = labels
                .iter()
                .all(|(k, v)| object.meta().labels.get(k) == Some(v));
            if matches {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    pub async fn create<K: Object>(&self, object: &K) -> Result<K> {
        let value = serde_json::to_value(object)?;
        let created = self.store.create(K::KIND, &object.key(), value).await?;
        Ok(serde_json::from_value(created)?)
    }

    /// Write the difference between `before` and `after`
    ///
    /// Returns the live object. Nothing is sent when the two are equal.
    pub async fn patch<K: Object>(&self, before: &K, after: &K) -> Result<K> {
        let before_value = serde_json::to_value(before)?;
        let after_value = serde_json::to_value(after)?;
        match merge_diff(&before_value, &after_value) {
            Some(patch) => {
                let live = self.store.patch(K::KIND, &after.key(), patch).await?;
                Ok(serde_json::from_value(live)?)
            }
            None => Ok(after.clone()),
        }
    }

    /// Create `desired` or patch the live object toward it
    ///
    /// `mutate` receives the live object (or a fresh one) and must only set
    /// the fields this caller owns.
    pub async fn create_or_patch<K, F>(&self, fresh: K, mutate: F) -> Result<(K, bool)>
    where
        K: Object,
        F: FnOnce(&mut K),
    {
        match self.find::<K>(&fresh.key()).await? {
            Some(live) => {
                let mut desired = live.clone();
                mutate(&mut desired);
                Ok((self.patch(&live, &desired).await?, false))
            }
            None => {
                let mut desired = fresh;
                mutate(&mut desired);
                Ok((self.create(&desired).await?, true))
            }
        }
    }

    pub async fn delete<K: Object>(&self, key: &ObjectKey) -> Result<()> {
        self.store.delete(K::KIND, key).await
    }
}

/// Tracks the last written state of one object
///
/// Each [`patch`](Patcher::patch) sends only what changed since the previous
/// one, so a reconcile can persist intermediate state (e.g. an in-flight task
/// reference) and still write its final status once at the end.
pub struct Patcher<K: Object> {
    client: Client,
    before: K,
}

impl<K: Object> Patcher<K> {
    pub fn new(client: Client, object: &K) -> Self {
        Self {
            client,
            before: object.clone(),
        }
    }

    /// Write pending changes of `object` and rebase onto the live object
    pub async fn patch(&mut self, object: &mut K) -> Result<()> {
        let live = self.client.patch(&self.before, object).await?;
        *object = live.clone();
        self.before = live;
        Ok(())
    }
}

/// Compute the merge patch turning `before` into `after`
///
/// Objects are diffed key by key, removed keys become `null`, everything
/// else (arrays included) is replaced wholesale.
pub fn merge_diff(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, after_value) in a {
                match b.get(key) {
                    Some(before_value) => {
                        if let Some(diff) = merge_diff(before_value, after_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), after_value.clone());
                    }
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        (b, a) if b == a => None,
        (_, a) => Some(a.clone()),
    }
}

/// Apply a JSON merge patch in place
pub fn merge_apply(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_obj), Value::Object(patch_obj)) => {
            for (key, patch_value) in patch_obj {
                if patch_value.is_null() {
                    target_obj.remove(&key);
                    continue;
                }
                match target_obj.get_mut(&key) {
                    Some(target_value) => merge_apply(target_value, patch_value),
                    None => {
                        let mut fresh = Value::Null;
                        merge_apply(&mut fresh, patch_value);
                        target_obj.insert(key, fresh);
                    }
                }
            }
        }
        (target_slot, Value::Object(patch_obj)) => {
            *target_slot = Value::Object(Map::new());
            merge_apply(target_slot, Value::Object(patch_obj));
        }
        (target_slot, patch_value) => *target_slot = patch_value,
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    type Objects = BTreeMap<(String, ObjectKey), Value>;

    /// In-memory [`Store`] for tests
    ///
    /// Bumps `metadata.generation` on every write and honours finalizers on
    /// delete by setting `metadata.deletionTimestamp` once.
    #[derive(Default, Clone)]
    pub struct MemoryStore {
        objects: Arc<Mutex<Objects>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn objects(&self) -> std::sync::MutexGuard<'_, Objects> {
            match self.objects.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        /// Number of stored objects of `kind`
        pub fn count(&self, kind: &str) -> usize {
            self.objects().keys().filter(|(k, _)| k == kind).count()
        }
    }

    fn bump_generation(object: &mut Value) {
        if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            let generation = meta.get("generation").and_then(Value::as_u64).unwrap_or(0);
            meta.insert("generation".to_string(), Value::from(generation + 1));
        }
    }

    fn has_finalizers(object: &Value) -> bool {
        object
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|f| !f.is_empty())
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Value> {
            self.objects()
                .get(&(kind.to_string(), key.clone()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    kind: kind.to_string(),
                    key: key.clone(),
                })
        }

        async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Value>> {
            Ok(self
                .objects()
                .iter()
                .filter(|((k, key), _)| k == kind && key.namespace == namespace)
                .map(|(_, v)| v.clone())
                .collect())
        }

        async fn create(&self, kind: &str, key: &ObjectKey, mut object: Value) -> Result<Value> {
            let mut objects = self.objects();
            let slot = (kind.to_string(), key.clone());
            if objects.contains_key(&slot) {
                return Err(StoreError::AlreadyExists {
                    kind: kind.to_string(),
                    key: key.clone(),
                });
            }
            bump_generation(&mut object);
            objects.insert(slot, object.clone());
            Ok(object)
        }

        async fn patch(&self, kind: &str, key: &ObjectKey, patch: Value) -> Result<Value> {
            let mut objects = self.objects();
            let live = objects
                .get_mut(&(kind.to_string(), key.clone()))
                .ok_or_else(|| StoreError::NotFound {
                    kind: kind.to_string(),
                    key: key.clone(),
                })?;
            merge_apply(live, patch);
            bump_generation(live);
            let released =
                live.pointer("/metadata/deletionTimestamp").is_some() && !has_finalizers(live);
            let live = live.clone();
            if released {
                objects.remove(&(kind.to_string(), key.clone()));
            }
            Ok(live)
        }

        async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<()> {
            let mut objects = self.objects();
            let slot = (kind.to_string(), key.clone());
            let Some(live) = objects.get_mut(&slot) else {
                return Err(StoreError::NotFound {
                    kind: kind.to_string(),
                    key: key.clone(),
                });
            };
            if !has_finalizers(live) {
                objects.remove(&slot);
                return Ok(());
            }
            if live.pointer("/metadata/deletionTimestamp").is_none() {
                if let Some(meta) = live.get_mut("metadata").and_then(Value::as_object_mut) {
                    meta.insert(
                        "deletionTimestamp".to_string(),
                        serde_json::to_value(Utc::now())?,
                    );
                }
                bump_generation(live);
            }
            Ok(())
        }
    }
}
