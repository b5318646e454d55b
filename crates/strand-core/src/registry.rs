//! Label registry: label set (nodes) or relationship type (edges) to model
//! descriptor, with optional per-database scoping.
//!
//! Lookups consult the database-specific bindings first and fall back to
//! the global ones. Registration is serialized behind a write lock; reads
//! are concurrent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Candidate, RegistryError, Result as StrandResult};
use crate::model::{DescriptorRef, ModelDescriptor, RegistryKey};

/// Outcome of binding one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// A reloadable model replaced an existing binding.
    Replaced { previous: String },
    /// The same model was already bound to this key.
    Unchanged,
}

/// A failed lookup, with everything the registry knows.
#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
    pub key: RegistryKey,
    pub database: Option<String>,
    pub candidates: Vec<Candidate>,
}

#[derive(Default)]
struct Scope {
    bindings: HashMap<RegistryKey, DescriptorRef>,
    models: HashMap<String, DescriptorRef>,
}

#[derive(Default)]
struct RegistryState {
    global: Scope,
    databases: BTreeMap<String, Scope>,
}

impl RegistryState {
    fn scope(&self, database: Option<&str>) -> Option<&Scope> {
        match database {
            None => Some(&self.global),
            Some(db) => self.databases.get(db),
        }
    }

    fn scope_mut(&mut self, database: Option<&str>) -> &mut Scope {
        match database {
            None => &mut self.global,
            Some(db) => self.databases.entry(db.to_string()).or_default(),
        }
    }

    fn candidates(&self) -> Vec<Candidate> {
        let mut out = collect_candidates(&self.global, None);
        for (db, scope) in &self.databases {
            out.extend(collect_candidates(scope, Some(db)));
        }
        out
    }

    /// Decide what binding `key` would do, without mutating.
    fn check(
        &self,
        key: &RegistryKey,
        descriptor: &DescriptorRef,
        database: Option<&str>,
    ) -> Result<Registration, RegistryError> {
        let Some(existing) = self.scope(database).and_then(|s| s.bindings.get(key)) else {
            return Ok(Registration::Inserted);
        };
        let same_model = Arc::ptr_eq(existing, descriptor)
            || (matches!(key, RegistryKey::Relationship(_)) && **existing == **descriptor);
        if same_model {
            Ok(Registration::Unchanged)
        } else if descriptor.reloadable {
            Ok(Registration::Replaced {
                previous: existing.name.clone(),
            })
        } else {
            Err(RegistryError::AlreadyDefined {
                key: key.clone(),
                model: descriptor.name.clone(),
                existing: existing.name.clone(),
                database: database.map(str::to_string),
                candidates: self.candidates(),
            })
        }
    }
}

fn collect_candidates(scope: &Scope, database: Option<&str>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = scope
        .bindings
        .iter()
        .map(|(key, d)| Candidate {
            key: key.clone(),
            model: d.name.clone(),
            database: database.map(str::to_string),
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

/// Process-wide or injected map from label sets and relationship types to
/// model descriptors.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide registry.
    pub fn global() -> Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Registry::new())).clone()
    }

    /// Bind a single key in the given scope.
    pub fn register(
        &self,
        key: RegistryKey,
        descriptor: DescriptorRef,
        database: Option<&str>,
    ) -> Result<Registration, RegistryError> {
        let mut state = self.state.write();
        let outcome = state.check(&key, &descriptor, database)?;
        apply(&mut state, key, &descriptor, database, &outcome);
        Ok(outcome)
    }

    /// Register every key a model implies, in each of its target databases
    /// (or globally). Either all keys are bound or none are.
    pub fn register_model(
        &self,
        descriptor: &DescriptorRef,
    ) -> Result<Vec<Registration>, RegistryError> {
        let databases: Vec<Option<&str>> = if descriptor.target_databases.is_empty() {
            vec![None]
        } else {
            descriptor
                .target_databases
                .iter()
                .map(|db| Some(db.as_str()))
                .collect()
        };
        let keys = descriptor.registry_keys()?;

        let mut state = self.state.write();
        let mut planned = Vec::with_capacity(keys.len() * databases.len());
        for db in &databases {
            for key in &keys {
                planned.push((key.clone(), *db, state.check(key, descriptor, *db)?));
            }
        }

        let mut outcomes = Vec::with_capacity(planned.len());
        for (key, db, outcome) in planned {
            apply(&mut state, key, descriptor, db, &outcome);
            outcomes.push(outcome);
        }
        if !outcomes.iter().all(|o| *o == Registration::Unchanged) {
            tracing::debug!(model = %descriptor.name, keys = keys.len(), "Registered model");
        }
        Ok(outcomes)
    }

    /// Register every model of a JSON array of descriptors, in order.
    /// Returns the registered descriptors.
    pub fn register_json(&self, json: &str) -> StrandResult<Vec<DescriptorRef>> {
        let models: Vec<ModelDescriptor> = serde_json::from_str(json)?;
        let mut registered = Vec::with_capacity(models.len());
        for model in models {
            let descriptor = Arc::new(model);
            self.register_model(&descriptor)?;
            registered.push(descriptor);
        }
        Ok(registered)
    }

    /// Look up a key, database-specific bindings first.
    pub fn resolve(
        &self,
        key: &RegistryKey,
        database: Option<&str>,
    ) -> Result<DescriptorRef, Unresolved> {
        let state = self.state.read();
        let scoped = database
            .and_then(|db| state.databases.get(db))
            .and_then(|s| s.bindings.get(key));
        match scoped.or_else(|| state.global.bindings.get(key)) {
            Some(d) => Ok(d.clone()),
            None => Err(Unresolved {
                key: key.clone(),
                database: database.map(str::to_string),
                candidates: state.candidates(),
            }),
        }
    }

    /// Look up a model by name, database-specific models first.
    pub fn model(&self, name: &str, database: Option<&str>) -> Result<DescriptorRef, RegistryError> {
        let state = self.state.read();
        let scoped = database
            .and_then(|db| state.databases.get(db))
            .and_then(|s| s.models.get(name));
        scoped
            .or_else(|| state.global.models.get(name))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    /// Every binding, global first, then per database.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.state.read().candidates()
    }

    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.global.bindings.len()
            + state
                .databases
                .values()
                .map(|s| s.bindings.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every binding. Intended for test harnesses.
    pub fn reset(&self) {
        *self.state.write() = RegistryState::default();
    }
}

fn apply(
    state: &mut RegistryState,
    key: RegistryKey,
    descriptor: &DescriptorRef,
    database: Option<&str>,
    outcome: &Registration,
) {
    if *outcome == Registration::Unchanged {
        return;
    }
    if let Registration::Replaced { previous } = outcome {
        tracing::warn!(
            key = %key,
            database = database.unwrap_or("<global>"),
            previous = %previous,
            model = %descriptor.name,
            "Reloadable model replaced an existing registry binding"
        );
    }
    let scope = state.scope_mut(database);
    scope.bindings.insert(key, descriptor.clone());
    scope
        .models
        .insert(descriptor.name.clone(), descriptor.clone());
}
