use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::executor::{ThreadPool, block_on};
use futures::future::BoxFuture;
use futures::task::{FutureObj, Spawn, SpawnError, SpawnExt};
use thiserror::Error;

use super::entity::{FieldData, FieldEntity, FieldError, NotifyInfo, UpdateSource};
use super::error_cache::ErrorCache;
use super::instance::FormInstance;
use crate::name_map::NameMap;
use crate::name_path::{NamePath, contains_name_path};
use crate::validation::{ErrorMessage, ValidateMessages};
use crate::value::{StoreValue, clone_by_name_path_list, get_value, set_value, set_values};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("value at `{name_path}` could not be converted: {message}")]
    ValueConversion { name_path: NamePath, message: String },
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub enum ReducerAction {
    UpdateValue {
        name_path: NamePath,
        value: Option<StoreValue>,
    },
}

pub type ValuesChangeFn = Arc<dyn Fn(&StoreValue, &StoreValue) + Send + Sync>;
pub type FieldsChangeFn = Arc<dyn Fn(&[FieldData], &[FieldData]) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_values_change: Option<ValuesChangeFn>,
    pub on_fields_change: Option<FieldsChangeFn>,
}

impl Debug for Callbacks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_values_change", &self.on_values_change.is_some())
            .field("on_fields_change", &self.on_fields_change.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn on_values_change(
        mut self,
        callback: impl Fn(&StoreValue, &StoreValue) + Send + Sync + 'static,
    ) -> Self {
        self.on_values_change = Some(Arc::new(callback));
        self
    }

    pub fn on_fields_change(
        mut self,
        callback: impl Fn(&[FieldData], &[FieldData]) + Send + Sync + 'static,
    ) -> Self {
        self.on_fields_change = Some(Arc::new(callback));
        self
    }
}

/// Executor for validation settle tasks.
pub trait ValidationSpawner: Send + Sync {
    fn spawn_validation(&self, task: BoxFuture<'static, ()>);
}

impl<S> ValidationSpawner for S
where
    S: Spawn + Send + Sync,
{
    fn spawn_validation(&self, task: BoxFuture<'static, ()>) {
        if let Err(error) = self.spawn(task) {
            tracing::error!(%error, "failed to spawn validation task");
        }
    }
}

struct ThreadSpawner;

impl Spawn for ThreadSpawner {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        std::thread::Builder::new()
            .name("calmform-validate".to_string())
            .spawn(move || block_on(future))
            .map(|_| ())
            .map_err(|_| SpawnError::shutdown())
    }
}

fn default_spawner() -> Arc<dyn ValidationSpawner> {
    static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();
    let pool = POOL.get_or_init(|| {
        ThreadPool::builder()
            .pool_size(1)
            .name_prefix("calmform-validate-")
            .create()
            .map_err(|error| {
                tracing::warn!(%error, "validation pool unavailable, using one thread per task");
            })
            .ok()
    });
    match pool {
        Some(pool) => Arc::new(pool.clone()),
        None => Arc::new(ThreadSpawner),
    }
}

#[derive(Clone, Default)]
pub struct FormOptions {
    pub spawner: Option<Arc<dyn ValidationSpawner>>,
    pub initial_values: Option<StoreValue>,
    pub validate_messages: Option<ValidateMessages>,
    pub callbacks: Callbacks,
}

impl FormOptions {
    pub fn with_spawner(mut self, spawner: impl ValidationSpawner + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn with_initial_values(mut self, values: impl Into<StoreValue>) -> Self {
        self.initial_values = Some(values.into());
        self
    }

    pub fn with_validate_messages(mut self, messages: ValidateMessages) -> Self {
        self.validate_messages = Some(messages);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

pub(super) struct FormState {
    pub(super) store: StoreValue,
    pub(super) initial_values: StoreValue,
    pub(super) field_entities: Vec<Arc<dyn FieldEntity>>,
    pub(super) error_cache: ErrorCache,
    pub(super) callbacks: Callbacks,
    pub(super) validate_messages: Option<Arc<ValidateMessages>>,
    pub(super) last_validation: Option<ValidationTicket>,
    pub(super) next_ticket: u64,
}

impl FormState {
    pub(super) fn issue_ticket(&mut self) -> ValidationTicket {
        self.next_ticket += 1;
        let ticket = ValidationTicket(self.next_ticket);
        self.last_validation = Some(ticket);
        ticket
    }
}

/// Owner of the value tree, the error cache and the field registry.
#[derive(Clone)]
pub struct FormStore {
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) spawner: Arc<dyn ValidationSpawner>,
}

#[derive(Clone)]
pub(crate) struct WeakFormStore {
    state: Weak<RwLock<FormState>>,
    spawner: Arc<dyn ValidationSpawner>,
}

impl WeakFormStore {
    pub(crate) fn upgrade(&self) -> Option<FormStore> {
        Some(FormStore {
            state: self.state.upgrade()?,
            spawner: self.spawner.clone(),
        })
    }
}

impl Default for FormStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FormStore {
    pub fn new() -> Self {
        Self::with_options(FormOptions::default())
    }

    pub fn with_options(options: FormOptions) -> Self {
        let initial_values = options.initial_values.unwrap_or_default();
        Self {
            state: Arc::new(RwLock::new(FormState {
                store: set_values(&StoreValue::empty(), [&initial_values]),
                initial_values,
                field_entities: Vec::new(),
                error_cache: ErrorCache::default(),
                callbacks: options.callbacks,
                validate_messages: options.validate_messages.map(Arc::new),
                last_validation: None,
                next_ticket: 0,
            })),
            spawner: options.spawner.unwrap_or_else(default_spawner),
        }
    }

    pub fn form(&self) -> FormInstance {
        FormInstance::from_store(self.clone())
    }

    pub(crate) fn downgrade(&self) -> WeakFormStore {
        WeakFormStore {
            state: Arc::downgrade(&self.state),
            spawner: self.spawner.clone(),
        }
    }

    pub(crate) fn set_initial_values(&self, values: StoreValue, init: bool) -> FormResult<()> {
        let mut state = write_lock(&self.state, "setting initial values")?;
        if init {
            let merged = set_values(&StoreValue::empty(), [&values, &state.store]);
            state.store = merged;
        }
        state.initial_values = values;
        Ok(())
    }

    pub(crate) fn set_callbacks(&self, callbacks: Callbacks) -> FormResult<()> {
        write_lock(&self.state, "setting callbacks")?.callbacks = callbacks;
        Ok(())
    }

    pub(crate) fn set_validate_messages(&self, messages: ValidateMessages) -> FormResult<()> {
        write_lock(&self.state, "setting validate messages")?.validate_messages =
            Some(Arc::new(messages));
        Ok(())
    }

    /// Point-in-time copy of the registry. `pure` keeps only named entities.
    pub(crate) fn field_entities(&self, pure: bool) -> FormResult<Vec<Arc<dyn FieldEntity>>> {
        let entities = read_lock(&self.state, "reading field entities")?
            .field_entities
            .clone();
        Ok(if pure {
            entities
                .into_iter()
                .filter(|entity| !entity.name_path().is_empty())
                .collect()
        } else {
            entities
        })
    }

    pub(crate) fn get_fields_value(&self, name_list: Option<&[NamePath]>) -> FormResult<StoreValue> {
        let state = read_lock(&self.state, "reading field values")?;
        Ok(match name_list {
            None => state.store.clone(),
            Some(paths) => clone_by_name_path_list(&state.store, paths),
        })
    }

    pub(crate) fn get_field_value(&self, name_path: &NamePath) -> FormResult<Option<StoreValue>> {
        Ok(get_value(&read_lock(&self.state, "reading field value")?.store, name_path).cloned())
    }

    pub(crate) fn get_fields_error(
        &self,
        name_list: Option<&[NamePath]>,
    ) -> FormResult<Vec<FieldError>> {
        Ok(read_lock(&self.state, "reading field errors")?
            .error_cache
            .get_fields_error(name_list))
    }

    pub(crate) fn get_field_error(&self, name_path: &NamePath) -> FormResult<Vec<ErrorMessage>> {
        Ok(self
            .get_fields_error(Some(std::slice::from_ref(name_path)))?
            .into_iter()
            .next()
            .map(|field| field.errors)
            .unwrap_or_default())
    }

    pub(crate) fn is_fields_touched(&self, name_list: Option<&[NamePath]>) -> FormResult<bool> {
        Ok(self.field_entities(false)?.iter().any(|entity| {
            name_list.is_none_or(|paths| contains_name_path(paths, &entity.name_path()))
                && entity.is_field_touched()
        }))
    }

    pub(crate) fn is_fields_validating(&self, name_list: Option<&[NamePath]>) -> FormResult<bool> {
        Ok(self.field_entities(false)?.iter().any(|entity| {
            name_list.is_none_or(|paths| contains_name_path(paths, &entity.name_path()))
                && entity.is_field_validating()
        }))
    }

    pub(crate) fn reset_fields(&self, name_list: Option<&[NamePath]>) -> FormResult<()> {
        let prev_store = {
            let mut state = write_lock(&self.state, "resetting fields")?;
            let prev_store = state.store.clone();
            match name_list {
                None => {
                    let initial_values = state.initial_values.clone();
                    state.store = set_values(&StoreValue::empty(), [&initial_values]);
                    state.error_cache = ErrorCache::default();
                }
                Some(paths) => {
                    for path in paths {
                        state.error_cache.reset_field(path);
                        let initial_value = get_value(&state.initial_values, path).cloned();
                        let next = set_value(&state.store, path, initial_value);
                        state.store = next;
                    }
                }
            }
            prev_store
        };
        self.notify_observers(&prev_store, name_list, &NotifyInfo::Reset)
    }

    pub(crate) fn set_fields(&self, fields: Vec<FieldData>) -> FormResult<()> {
        let prev_store = read_lock(&self.state, "reading store before set fields")?
            .store
            .clone();
        for data in fields {
            {
                let mut state = write_lock(&self.state, "setting field data")?;
                if let Some(value) = &data.value {
                    let next = set_value(&state.store, &data.name, Some(value.clone()));
                    state.store = next;
                }
                if let Some(errors) = &data.errors {
                    state.error_cache.update_error([FieldError {
                        name: data.name.clone(),
                        errors: errors.clone(),
                    }]);
                }
            }
            let name_paths = [data.name.clone()];
            self.notify_observers(
                &prev_store,
                Some(name_paths.as_slice()),
                &NotifyInfo::SetField { data },
            )?;
        }
        Ok(())
    }

    pub(crate) fn get_fields(&self, name_list: Option<&[NamePath]>) -> FormResult<Vec<FieldData>> {
        let (entities, store) = {
            let state = read_lock(&self.state, "reading fields")?;
            (state.field_entities.clone(), state.store.clone())
        };

        Ok(match name_list {
            None => entities
                .iter()
                .filter_map(|entity| {
                    let name_path = entity.name_path();
                    (!name_path.is_empty()).then(|| {
                        let value = get_value(&store, &name_path).cloned();
                        FieldData::from_meta(name_path, value, entity.meta())
                    })
                })
                .collect(),
            Some(paths) => {
                let mut by_name = NameMap::new();
                for entity in &entities {
                    by_name.set(entity.name_path(), entity.clone());
                }
                paths
                    .iter()
                    .map(|path| {
                        let meta = by_name
                            .get(path)
                            .map(|entity| entity.meta())
                            .unwrap_or_default();
                        FieldData::from_meta(path.clone(), get_value(&store, path).cloned(), meta)
                    })
                    .collect()
            }
        })
    }

    pub(crate) fn register_field(&self, entity: Arc<dyn FieldEntity>) -> FormResult<Unregister> {
        write_lock(&self.state, "registering field entity")?
            .field_entities
            .push(entity.clone());
        tracing::trace!(name_path = %entity.name_path(), "field registered");
        Ok(Unregister {
            state: Arc::downgrade(&self.state),
            entity: Arc::downgrade(&entity),
        })
    }

    pub(crate) fn dispatch(&self, action: ReducerAction) -> FormResult<()> {
        match action {
            ReducerAction::UpdateValue { name_path, value } => self.update_value(&name_path, value),
        }
    }

    pub(crate) fn notify_observers(
        &self,
        prev_store: &StoreValue,
        name_paths: Option<&[NamePath]>,
        info: &NotifyInfo,
    ) -> FormResult<()> {
        let entities = self.field_entities(false)?;
        tracing::trace!(?info, entities = entities.len(), "notifying field entities");
        for entity in entities {
            entity.on_store_change(prev_store, name_paths, info);
        }
        Ok(())
    }

    pub(crate) fn update_value(
        &self,
        name_path: &NamePath,
        value: Option<StoreValue>,
    ) -> FormResult<()> {
        let prev_store = {
            let mut state = write_lock(&self.state, "updating field value")?;
            let prev_store = state.store.clone();
            state.store = set_value(&prev_store, name_path, value);
            prev_store
        };
        let origin = std::slice::from_ref(name_path);

        self.notify_observers(
            &prev_store,
            Some(origin),
            &NotifyInfo::ValueUpdate {
                source: UpdateSource::Internal,
            },
        )?;

        let children = self.dependency_children_fields(name_path)?;
        tracing::debug!(origin = %name_path, dependents = children.len(), "revalidating dependents");
        // Issued even for no dependents: a value change makes in-flight cycles stale.
        // Settles on the spawner; nothing here waits for it.
        let _ = self.validate_fields(Some(children.as_slice()), Default::default())?;

        let mut related_fields = Vec::with_capacity(children.len() + 1);
        related_fields.push(name_path.clone());
        related_fields.extend(children.iter().cloned());
        self.notify_observers(
            &prev_store,
            Some(children.as_slice()),
            &NotifyInfo::DependenciesUpdate {
                related_fields: related_fields.clone(),
            },
        )?;

        let (on_values_change, store) = {
            let state = read_lock(&self.state, "reading values change callback")?;
            (state.callbacks.on_values_change.clone(), state.store.clone())
        };
        if let Some(on_values_change) = on_values_change {
            let changed_values = clone_by_name_path_list(&store, origin);
            on_values_change(&changed_values, &store);
        }

        self.trigger_on_fields_change(&related_fields)
    }

    pub(crate) fn set_fields_value(&self, values: &StoreValue) -> FormResult<()> {
        let prev_store = {
            let mut state = write_lock(&self.state, "merging field values")?;
            let prev_store = state.store.clone();
            state.store = set_values(&prev_store, [values]);
            prev_store
        };
        self.notify_observers(
            &prev_store,
            None,
            &NotifyInfo::ValueUpdate {
                source: UpdateSource::External,
            },
        )
    }

    /// Touched, named dependents of `root`, transitively, in discovery order.
    pub(crate) fn dependency_children_fields(&self, root: &NamePath) -> FormResult<Vec<NamePath>> {
        let entities = self.field_entities(false)?;
        let mut dependents: NameMap<Vec<Arc<dyn FieldEntity>>> = NameMap::new();
        for entity in &entities {
            for dependency in &entity.props().dependencies {
                dependents.update(
                    dependency.clone(),
                    |mut fields| {
                        fields.push(entity.clone());
                        fields
                    },
                    Vec::new(),
                );
            }
        }

        let mut visited = HashSet::new();
        let mut children = Vec::new();
        fill_children(&dependents, root, &mut visited, &mut children);
        Ok(children)
    }

    pub(crate) fn trigger_on_fields_change(&self, name_paths: &[NamePath]) -> FormResult<()> {
        let on_fields_change = read_lock(&self.state, "reading fields change callback")?
            .callbacks
            .on_fields_change
            .clone();
        if let Some(on_fields_change) = on_fields_change {
            let fields = self.get_fields(None)?;
            let changed_fields = fields
                .iter()
                .filter(|field| contains_name_path(name_paths, &field.name))
                .cloned()
                .collect::<Vec<_>>();
            on_fields_change(&changed_fields, &fields);
        }
        Ok(())
    }
}

fn entity_key(entity: &Arc<dyn FieldEntity>) -> *const () {
    Arc::as_ptr(entity) as *const ()
}

fn fill_children(
    dependents: &NameMap<Vec<Arc<dyn FieldEntity>>>,
    name_path: &NamePath,
    visited: &mut HashSet<*const ()>,
    children: &mut Vec<NamePath>,
) {
    let Some(fields) = dependents.get(name_path) else {
        return;
    };
    for field in fields {
        if !visited.insert(entity_key(field)) {
            continue;
        }
        let field_path = field.name_path();
        if field.is_field_touched() && !field_path.is_empty() {
            children.push(field_path.clone());
            fill_children(dependents, &field_path, visited, children);
        }
    }
}

/// Removes exactly the entity it was issued for. Calling it again is a no-op.
pub struct Unregister {
    state: Weak<RwLock<FormState>>,
    entity: Weak<dyn FieldEntity>,
}

impl Unregister {
    pub(crate) fn noop() -> Self {
        let entity: Weak<dyn FieldEntity> = Weak::<super::Field>::new();
        Self {
            state: Weak::new(),
            entity,
        }
    }

    pub fn unregister(&self) -> FormResult<()> {
        let Some(state) = self.state.upgrade() else {
            return Ok(());
        };
        let target = self.entity.as_ptr() as *const ();
        write_lock(&state, "unregistering field entity")?
            .field_entities
            .retain(|entity| entity_key(entity) != target);
        Ok(())
    }
}

impl Default for Unregister {
    fn default() -> Self {
        Self::noop()
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
