use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::outcome::{LoadOutcome, LoadSource, MutationOutcome, MutationStatus, SyncStatus};
use super::remote::call_remote;
use crate::cache::{CacheScope, LocalCache};
use crate::config::SyncConfig;
use crate::id::{is_valid_id, new_uuid_v7};
use crate::model::{Entity, IMMUTABLE_FIELDS};
use crate::store::{RemoteOp, RemoteStore, Row};
use crate::sync_errors::{validation_error, SyncErrorCode, SyncWarning};
use crate::time::now_ms;
use crate::AppResult;

struct State<T> {
    owner_id: Option<String>,
    items: Vec<T>,
    status: HashMap<String, SyncStatus>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            owner_id: None,
            items: Vec::new(),
            status: HashMap::new(),
        }
    }
}

/// Local-first collection of one entity type for one owner.
///
/// Mutations are applied in memory and written to the cache before the
/// remote call is awaited, and are never rolled back when that call fails.
/// A later `load` replaces local state with whatever the remote holds.
pub struct SyncedCollection<T: Entity> {
    remote: Arc<dyn RemoteStore>,
    cache: LocalCache,
    config: Arc<SyncConfig>,
    state: Arc<Mutex<State<T>>>,
}

impl<T: Entity> Clone for SyncedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            cache: self.cache.clone(),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
        }
    }
}

fn to_object(value: Value, field: &str) -> AppResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        _ => Err(validation_error(field, format!("{field} must be an object"))),
    }
}

impl<T: Entity> SyncedCollection<T> {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: LocalCache, config: Arc<SyncConfig>) -> Self {
        Self {
            remote,
            cache,
            config,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    pub fn owner_id(&self) -> Option<String> {
        self.lock().owner_id.clone()
    }

    /// Bind the collection to an owner without touching the remote.
    pub fn set_owner(&self, owner_id: impl Into<String>) {
        let mut state = self.lock();
        let owner_id = owner_id.into();
        if state.owner_id.as_deref() != Some(owner_id.as_str()) {
            state.items.clear();
            state.status.clear();
        }
        state.owner_id = Some(owner_id);
    }

    pub(crate) fn set_owner_if_unbound(&self, owner_id: &str) {
        let mut state = self.lock();
        if state.owner_id.is_none() && !owner_id.trim().is_empty() {
            state.owner_id = Some(owner_id.to_string());
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.lock().items.iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn sync_status(&self, id: &str) -> Option<SyncStatus> {
        self.lock().status.get(id).copied()
    }

    /// Entities whose latest mutation failed to reach the remote.
    pub fn unsynced(&self) -> Vec<T> {
        let state = self.lock();
        state
            .items
            .iter()
            .filter(|e| state.status.get(e.id()) == Some(&SyncStatus::PersistFailed))
            .cloned()
            .collect()
    }

    pub fn cache_scope(&self) -> Option<CacheScope> {
        self.owner_id().map(|owner| CacheScope::new(T::TABLE, owner))
    }

    /// Recompute derived, non-persisted fields in place.
    pub fn refresh_derived(&self, mut f: impl FnMut(&mut T)) {
        let mut state = self.lock();
        for item in state.items.iter_mut() {
            f(item);
        }
    }

    fn save_cache(&self, owner_id: &str, items: &[T]) {
        self.cache.save(&CacheScope::new(T::TABLE, owner_id), items);
    }

    fn set_status(&self, id: &str, status: SyncStatus) {
        let mut state = self.lock();
        if state.items.iter().any(|e| e.id() == id) {
            state.status.insert(id.to_string(), status);
        }
    }

    /// Replace local state with the owner's remote rows, falling back to the
    /// cached snapshot when the remote cannot be reached.
    pub async fn load(&self, owner_id: &str) -> LoadOutcome {
        if owner_id.trim().is_empty() {
            warn!(target: "quadrant", event = "load_without_owner", table = T::TABLE);
            return LoadOutcome {
                source: LoadSource::Unavailable,
                count: self.len(),
                rejected: 0,
                warning: Some(SyncWarning::new(SyncErrorCode::ValidationFailed, T::TABLE)),
            };
        }
        let order = T::default_order();
        let remote = &self.remote;
        let fetched = call_remote(&self.config, RemoteOp::Select, T::TABLE, || {
            remote.select(T::TABLE, owner_id, &order)
        })
        .await;

        match fetched {
            Ok(rows) => {
                let total = rows.len();
                let items = self.accept_rows(owner_id, rows);
                let rejected = total - items.len();
                let count = items.len();
                {
                    let mut state = self.lock();
                    let mut items = items;
                    for item in items.iter_mut() {
                        if let Some(prev) = state.items.iter().find(|p| p.id() == item.id()) {
                            item.carry_derived(prev);
                        }
                    }
                    state.status = items
                        .iter()
                        .map(|e| (e.id().to_string(), SyncStatus::Persisted))
                        .collect();
                    state.items = items;
                    state.owner_id = Some(owner_id.to_string());
                }
                self.save_cache(owner_id, &self.items());
                info!(
                    target: "quadrant",
                    event = "collection_loaded",
                    table = T::TABLE,
                    count,
                    rejected
                );
                LoadOutcome {
                    source: LoadSource::Remote,
                    count,
                    rejected,
                    warning: None,
                }
            }
            Err(err) => {
                let scope = CacheScope::new(T::TABLE, owner_id);
                let warning = SyncWarning::new(SyncErrorCode::FetchFailed, T::TABLE).caused_by(&err);
                let (source, items, rejected) = match self.cache.load::<T>(&scope) {
                    Some(snapshot) => {
                        let total = snapshot.items.len();
                        let items: Vec<T> = snapshot
                            .items
                            .into_iter()
                            .filter(|e| e.owner_id() == owner_id)
                            .collect();
                        let rejected = total - items.len();
                        (LoadSource::Cache, items, rejected)
                    }
                    None => (LoadSource::Unavailable, Vec::new(), 0),
                };
                let count = items.len();
                warn!(
                    target: "quadrant",
                    event = "load_fallback",
                    table = T::TABLE,
                    source = ?source,
                    count,
                    error = %err
                );
                {
                    let mut state = self.lock();
                    state.items = items;
                    state.status.clear();
                    state.owner_id = Some(owner_id.to_string());
                }
                LoadOutcome {
                    source,
                    count,
                    rejected,
                    warning: Some(warning),
                }
            }
        }
    }

    fn accept_rows(&self, owner_id: &str, rows: Vec<Row>) -> Vec<T> {
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let row_id = row
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if row.get("owner_id").and_then(Value::as_str) != Some(owner_id) {
                warn!(
                    target: "quadrant",
                    event = "foreign_owner_row",
                    table = T::TABLE,
                    id = %row_id
                );
                continue;
            }
            match T::from_row(row) {
                Ok(entity) => items.push(entity),
                Err(err) => warn!(
                    target: "quadrant",
                    event = "row_rejected",
                    table = T::TABLE,
                    id = %row_id,
                    error = %err
                ),
            }
        }
        items
    }

    fn resolve_owner(&self, requested: Option<&str>) -> AppResult<String> {
        let bound = self.owner_id();
        match (requested.filter(|o| !o.trim().is_empty()), bound) {
            (Some(req), Some(bound)) if req != bound => Err(validation_error(
                "owner_id",
                "entity owner does not match the collection owner",
            )),
            (Some(req), _) => Ok(req.to_string()),
            (None, Some(bound)) => Ok(bound),
            (None, None) => Err(validation_error("owner_id", "owner is required")),
        }
    }

    /// Create an entity from a draft. Validation failures are returned before
    /// any state changes; remote failures become warnings.
    pub async fn add<D: Serialize>(&self, draft: D) -> AppResult<MutationOutcome<T>> {
        let row = to_object(serde_json::to_value(draft)?, "draft")?;
        self.add_row(row).await
    }

    pub async fn add_row(&self, mut row: Row) -> AppResult<MutationOutcome<T>> {
        match row.get("id") {
            None | Some(Value::Null) => {
                row.insert("id".into(), Value::String(new_uuid_v7()));
            }
            Some(Value::String(id)) if is_valid_id(id) => {}
            Some(_) => return Err(validation_error("id", "id must be a UUID")),
        }
        let owner_id = self.resolve_owner(row.get("owner_id").and_then(Value::as_str))?;
        row.insert("owner_id".into(), Value::String(owner_id.clone()));
        let now = now_ms();
        row.insert("created_at".into(), Value::from(now));
        row.insert("updated_at".into(), Value::from(now));

        let entity = T::from_row(row)?;
        let payload = entity.to_row()?;

        let items = {
            let mut state = self.lock();
            if state.items.iter().any(|e| e.id() == entity.id()) {
                return Err(validation_error("id", "an entity with this id already exists"));
            }
            if state.owner_id.is_none() {
                state.owner_id = Some(owner_id.clone());
            }
            state.items.insert(0, entity.clone());
            state
                .status
                .insert(entity.id().to_string(), SyncStatus::AppliedLocally);
            state.items.clone()
        };
        self.save_cache(&owner_id, &items);
        debug!(target: "quadrant", event = "entity_added", table = T::TABLE, id = %entity.id());

        Ok(self.persist_insert(entity, payload).await)
    }

    async fn persist_insert(&self, entity: T, payload: Row) -> MutationOutcome<T> {
        let id = entity.id().to_string();
        self.set_status(&id, SyncStatus::Persisting);
        let remote = &self.remote;
        let result = call_remote(&self.config, RemoteOp::Insert, T::TABLE, || {
            remote.insert(T::TABLE, payload.clone())
        })
        .await;
        self.finish(entity, &id, result.map(|_| ()))
    }

    fn finish(&self, entity: T, id: &str, result: AppResult<()>) -> MutationOutcome<T> {
        match result {
            Ok(()) => {
                self.set_status(id, SyncStatus::Persisted);
                MutationOutcome {
                    entity: Some(entity),
                    status: MutationStatus::Persisted,
                    warnings: Vec::new(),
                }
            }
            Err(err) => {
                self.set_status(id, SyncStatus::PersistFailed);
                warn!(
                    target: "quadrant",
                    event = "persist_failed",
                    table = T::TABLE,
                    id = %id,
                    error = %err
                );
                MutationOutcome {
                    entity: Some(entity),
                    status: MutationStatus::PersistFailed,
                    warnings: vec![SyncWarning::new(SyncErrorCode::PersistFailed, T::TABLE)
                        .for_entity(id)
                        .caused_by(&err)],
                }
            }
        }
    }

    fn not_found(&self, id: &str) -> MutationOutcome<T> {
        debug!(target: "quadrant", event = "mutation_noop", table = T::TABLE, id = %id);
        MutationOutcome::no_op(SyncWarning::new(SyncErrorCode::NotFound, T::TABLE).for_entity(id))
    }

    /// Merge `patch` into the entity. `id`, `owner_id` and `created_at` are
    /// ignored; unknown fields are rejected.
    pub async fn update<P: Serialize>(&self, id: &str, patch: P) -> AppResult<MutationOutcome<T>> {
        let patch = to_object(serde_json::to_value(patch)?, "patch")?;
        let Some(current) = self.get(id) else {
            return Ok(self.not_found(id));
        };

        let mut merged = current.to_row()?;
        let mut changed: Vec<String> = Vec::new();
        for (key, value) in patch {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if !merged.contains_key(&key) && !value.is_null() {
                return Err(validation_error(&key, format!("unknown field {key}")));
            }
            merged.insert(key.clone(), value);
            changed.push(key);
        }
        merged.insert("updated_at".into(), Value::from(now_ms().max(current.updated_at())));
        changed.push("updated_at".into());

        let mut next = T::from_row(merged)?;
        next.carry_derived(&current);
        let full = next.to_row()?;
        let remote_patch: Row = changed
            .iter()
            .filter_map(|k| full.get(k).map(|v| (k.clone(), v.clone())))
            .collect();

        let applied = {
            let mut state = self.lock();
            match state.items.iter().position(|e| e.id() == id) {
                Some(index) => {
                    let prior = state.status.get(id).copied();
                    state.items[index] = next.clone();
                    state.status.insert(id.to_string(), SyncStatus::AppliedLocally);
                    state
                        .owner_id
                        .clone()
                        .map(|owner| (owner, state.items.clone(), prior))
                }
                None => None,
            }
        };
        let Some((owner_id, items, prior)) = applied else {
            return Ok(self.not_found(id));
        };
        self.save_cache(&owner_id, &items);

        // The remote may not hold this row yet; a column patch against a
        // missing row succeeds without writing anything.
        if prior != Some(SyncStatus::Persisted) {
            debug!(
                target: "quadrant",
                event = "update_sends_full_row",
                table = T::TABLE,
                id = %id,
                prior = ?prior
            );
            return Ok(self.persist_insert(next, full).await);
        }

        self.set_status(id, SyncStatus::Persisting);
        let remote = &self.remote;
        let owner = owner_id.as_str();
        let result = call_remote(&self.config, RemoteOp::Update, T::TABLE, || {
            remote.update(T::TABLE, owner, id, remote_patch.clone())
        })
        .await;
        Ok(self.finish(next, id, result))
    }

    /// Apply a closure to a copy of the entity and persist the fields it changed.
    pub async fn modify(&self, id: &str, f: impl FnOnce(&mut T)) -> AppResult<MutationOutcome<T>> {
        let Some(current) = self.get(id) else {
            return Ok(self.not_found(id));
        };
        let before = current.to_row()?;
        let mut next = current;
        f(&mut next);
        let patch: Row = next
            .to_row()?
            .into_iter()
            .filter(|(k, v)| before.get(k) != Some(v))
            .collect();
        self.update(id, patch).await
    }

    /// Flip a boolean field.
    pub async fn toggle(&self, id: &str, field: &str) -> AppResult<MutationOutcome<T>> {
        let Some(current) = self.get(id) else {
            return Ok(self.not_found(id));
        };
        let row = current.to_row()?;
        match row.get(field) {
            Some(Value::Bool(flag)) => {
                let mut patch = Row::new();
                patch.insert(field.to_string(), Value::Bool(!flag));
                self.update(id, patch).await
            }
            _ => Err(validation_error(field, format!("{field} is not a boolean field"))),
        }
    }

    /// Remove the entity, then best-effort delete the records it links to.
    pub async fn delete(&self, id: &str) -> MutationOutcome<T> {
        let removed = {
            let mut state = self.lock();
            match state.items.iter().position(|e| e.id() == id) {
                Some(index) => {
                    let entity = state.items.remove(index);
                    state.status.remove(id);
                    Some((entity, state.owner_id.clone(), state.items.clone()))
                }
                None => None,
            }
        };
        let Some((entity, owner_id, items)) = removed else {
            return self.not_found(id);
        };
        let owner_id = owner_id.unwrap_or_else(|| entity.owner_id().to_string());
        self.save_cache(&owner_id, &items);

        let remote = &self.remote;
        let owner = owner_id.as_str();
        let result = call_remote(&self.config, RemoteOp::Delete, T::TABLE, || {
            remote.delete(T::TABLE, owner, id)
        })
        .await;

        let mut outcome = match result {
            Ok(()) => MutationOutcome {
                entity: None,
                status: MutationStatus::Persisted,
                warnings: Vec::new(),
            },
            Err(err) => {
                warn!(
                    target: "quadrant",
                    event = "persist_failed",
                    table = T::TABLE,
                    id = %id,
                    error = %err
                );
                MutationOutcome {
                    entity: None,
                    status: MutationStatus::PersistFailed,
                    warnings: vec![SyncWarning::new(SyncErrorCode::PersistFailed, T::TABLE)
                        .for_entity(id)
                        .caused_by(&err)],
                }
            }
        };

        for link in entity.linked() {
            let link_id = link.id.as_str();
            let result = call_remote(&self.config, RemoteOp::Delete, link.table, || {
                remote.delete(link.table, owner, link_id)
            })
            .await;
            if let Err(err) = result {
                warn!(
                    target: "quadrant",
                    event = "cascade_failed",
                    table = link.table,
                    parent_id = %id,
                    id = %link.id,
                    error = %err
                );
                outcome.warnings.push(
                    SyncWarning::new(SyncErrorCode::CascadeFailed, link.table)
                        .for_entity(link.id.clone())
                        .caused_by(&err),
                );
            }
        }

        outcome.entity = Some(entity);
        outcome
    }

    /// Re-send the current local entity to the remote under the same id.
    pub async fn resync(&self, id: &str) -> AppResult<MutationOutcome<T>> {
        let Some(current) = self.get(id) else {
            return Ok(self.not_found(id));
        };
        let payload = current.to_row()?;
        info!(target: "quadrant", event = "resync", table = T::TABLE, id = %id);
        Ok(self.persist_insert(current, payload).await)
    }

    /// Drop an entity locally without a remote call, e.g. after the remote
    /// removed it as part of another delete.
    pub fn evict(&self, id: &str) -> Option<T> {
        let (entity, owner_id, items) = {
            let mut state = self.lock();
            let index = state.items.iter().position(|e| e.id() == id)?;
            let entity = state.items.remove(index);
            state.status.remove(id);
            (entity, state.owner_id.clone(), state.items.clone())
        };
        if let Some(owner_id) = owner_id {
            self.save_cache(&owner_id, &items);
        }
        Some(entity)
    }
}
