//! Debounced persistence of wizard state
//!
//! [`PersistenceManager`] owns a worker task that coalesces rapid
//! save requests: each request restarts a debounce timer, and only the
//! newest state is written when the timer fires.

use crate::error::WizardError;
use crate::persistence::storage::StorageBackend;
use crate::domain::state::WizardState;
use crate::types::{FormData, StepId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which parts of the state are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistField {
    /// The working data
    Data,
    /// The current step id
    CurrentStep,
    /// The navigation history
    History,
}

/// The serialized persistence payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    /// Persisted working data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FormData>,
    /// Persisted current step id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepId>,
    /// Persisted navigation history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<StepId>>,
}

impl PersistedState {
    /// Capture the configured fields from a snapshot
    pub fn capture(state: &WizardState, fields: &[PersistField]) -> Self {
        Self {
            data: fields
                .contains(&PersistField::Data)
                .then(|| state.data.clone()),
            current_step: fields
                .contains(&PersistField::CurrentStep)
                .then(|| state.current_step.id.clone()),
            history: fields
                .contains(&PersistField::History)
                .then(|| state.history.clone()),
        }
    }
}

pub(crate) enum PersistCommand {
    Save(PersistedState),
    Cancel,
}

/// Persistence configuration
#[derive(Clone)]
pub struct PersistenceConfig {
    /// Storage key
    pub key: String,
    /// Storage backend
    pub backend: Arc<dyn StorageBackend>,
    /// Debounce window for automatic saves
    pub debounce: Duration,
    /// Which parts of the state to persist
    pub fields: Vec<PersistField>,
}

impl PersistenceConfig {
    /// Configure persistence under `key` on the given backend, with the
    /// default 300ms debounce and all fields persisted
    pub fn new(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            key: key.into(),
            backend,
            debounce: Duration::from_millis(300),
            fields: vec![
                PersistField::Data,
                PersistField::CurrentStep,
                PersistField::History,
            ],
        }
    }

    /// Override the debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Restrict which parts of the state are persisted
    pub fn with_fields(mut self, fields: Vec<PersistField>) -> Self {
        self.fields = fields;
        self
    }
}

impl fmt::Debug for PersistenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceConfig")
            .field("key", &self.key)
            .field("debounce", &self.debounce)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Owns the storage backend and the debounce worker
pub struct PersistenceManager {
    key: String,
    fields: Vec<PersistField>,
    storage: Arc<dyn StorageBackend>,
    tx: mpsc::UnboundedSender<PersistCommand>,
    worker: JoinHandle<()>,
}

impl fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("key", &self.key)
            .field("fields", &self.fields)
            .finish()
    }
}

impl PersistenceManager {
    /// Create a manager and spawn its debounce worker
    pub fn new(config: PersistenceConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self::spawn_worker(
            rx,
            Arc::clone(&config.backend),
            config.key.clone(),
            config.debounce,
        );
        Self {
            key: config.key,
            fields: config.fields,
            storage: config.backend,
            tx,
            worker,
        }
    }

    fn spawn_worker(
        mut rx: mpsc::UnboundedReceiver<PersistCommand>,
        storage: Arc<dyn StorageBackend>,
        key: String,
        debounce: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending: Option<PersistedState> = None;
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        // A newer state supersedes the pending one and
                        // restarts the debounce timer
                        Some(PersistCommand::Save(state)) => pending = Some(state),
                        Some(PersistCommand::Cancel) => pending = None,
                        None => break,
                    },
                    _ = tokio::time::sleep(debounce), if pending.is_some() => {
                        if let Some(state) = pending.take() {
                            if let Err(err) = write(&*storage, &key, &state).await {
                                tracing::warn!(key = %key, error = %err, "debounced persist failed");
                            }
                        }
                    }
                }
            }
        })
    }

    /// The fields this manager persists
    pub fn fields(&self) -> &[PersistField] {
        &self.fields
    }

    /// The storage key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// A sender feeding the debounce worker
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<PersistCommand> {
        self.tx.clone()
    }

    /// Queue a debounced save of the configured fields
    pub fn save(&self, state: &WizardState) {
        let captured = PersistedState::capture(state, &self.fields);
        // Send fails only after destroy
        let _ = self.tx.send(PersistCommand::Save(captured));
    }

    /// Write the configured fields immediately, bypassing the debounce
    pub async fn save_immediate(&self, state: &WizardState) -> Result<(), WizardError> {
        let _ = self.tx.send(PersistCommand::Cancel);
        let captured = PersistedState::capture(state, &self.fields);
        write(&*self.storage, &self.key, &captured).await
    }

    /// Read the persisted payload
    ///
    /// Missing and malformed payloads both restore nothing; a malformed
    /// payload is logged and discarded.
    pub async fn restore(&self) -> Result<Option<PersistedState>, WizardError> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "discarding malformed persisted state");
                Ok(None)
            }
        }
    }

    /// Drop any pending save and delete the persisted payload
    pub async fn clear(&self) -> Result<(), WizardError> {
        let _ = self.tx.send(PersistCommand::Cancel);
        self.storage.remove(&self.key).await
    }

    /// Stop the debounce worker; pending saves are dropped
    pub fn destroy(self) {
        self.worker.abort();
    }
}

async fn write(
    storage: &dyn StorageBackend,
    key: &str,
    state: &PersistedState,
) -> Result<(), WizardError> {
    let payload = serde_json::to_string(state)?;
    storage.set(key, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::StateManager;
    use crate::domain::step::{StepDefinition, StepManager};
    use crate::persistence::storage::MemoryStorage;
    use serde_json::json;

    fn snapshot_with_data() -> WizardState {
        let steps = StepManager::new(
            vec![StepDefinition::new("a"), StepDefinition::new("b")],
            FormData::from_value(json!({"name": "Ada"})).unwrap(),
        );
        let mut manager = StateManager::new(steps, 1);
        manager.update(|s| s.history.push(StepId::from("a")));
        manager.snapshot()
    }

    fn config(backend: Arc<MemoryStorage>) -> PersistenceConfig {
        PersistenceConfig::new("wizard", backend).with_debounce(Duration::from_millis(20))
    }

    #[test]
    fn test_capture_honors_field_selection() {
        let state = snapshot_with_data();

        let all = PersistedState::capture(
            &state,
            &[
                PersistField::Data,
                PersistField::CurrentStep,
                PersistField::History,
            ],
        );
        assert_eq!(all.data.as_ref().unwrap().get_str("name"), Some("Ada"));
        assert_eq!(all.current_step, Some(StepId::from("b")));
        assert_eq!(all.history, Some(vec![StepId::from("a")]));

        let data_only = PersistedState::capture(&state, &[PersistField::Data]);
        assert!(data_only.data.is_some());
        assert!(data_only.current_step.is_none());
        assert!(data_only.history.is_none());
    }

    #[test]
    fn test_persisted_state_wire_format() {
        let state = PersistedState {
            data: Some(FormData::from_value(json!({"x": 1})).unwrap()),
            current_step: Some(StepId::from("b")),
            history: Some(vec![StepId::from("a")]),
        };
        let payload = serde_json::to_string(&state).unwrap();
        assert_eq!(
            payload,
            r#"{"data":{"x":1},"currentStep":"b","history":["a"]}"#
        );

        let partial: PersistedState = serde_json::from_str(r#"{"data":{}}"#).unwrap();
        assert!(partial.data.is_some());
        assert!(partial.current_step.is_none());
    }

    #[tokio::test]
    async fn test_save_immediate_and_restore() {
        let backend = Arc::new(MemoryStorage::new());
        let manager = PersistenceManager::new(config(Arc::clone(&backend)));

        manager.save_immediate(&snapshot_with_data()).await.unwrap();
        let restored = manager.restore().await.unwrap().unwrap();
        assert_eq!(restored.current_step, Some(StepId::from("b")));
        manager.destroy();
    }

    #[tokio::test]
    async fn test_debounce_coalesces_rapid_saves() {
        let backend = Arc::new(MemoryStorage::new());
        let manager = PersistenceManager::new(config(Arc::clone(&backend)));

        let mut state = snapshot_with_data();
        for i in 0..5 {
            state.data.set("counter", json!(i));
            manager.save(&state);
        }
        assert!(backend.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let restored = manager.restore().await.unwrap().unwrap();
        assert_eq!(restored.data.unwrap().get_f64("counter"), Some(4.0));
        manager.destroy();
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_save() {
        let backend = Arc::new(MemoryStorage::new());
        let manager = PersistenceManager::new(config(Arc::clone(&backend)));

        manager.save(&snapshot_with_data());
        manager.clear().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.restore().await.unwrap().is_none());
        manager.destroy();
    }

    #[tokio::test]
    async fn test_restore_discards_malformed_payload() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set("wizard", "not json").await.unwrap();

        let manager = PersistenceManager::new(config(Arc::clone(&backend)));
        assert!(manager.restore().await.unwrap().is_none());
        manager.destroy();
    }
}
