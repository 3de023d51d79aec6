use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures_timer::Delay;

use super::context::FieldContext;
use super::entity::{FieldEntity, FieldProps, Meta, NotifyInfo, UpdateSource};
use super::instance::{FormInstance, HOOK_MARK, WeakFormInstance};
use super::store::{FormResult, ReducerAction, Unregister, write_lock};
use super::validate::ValidateFieldsFuture;
use crate::name_path::{NamePath, contains_name_path};
use crate::validation::{ErrorMessage, ValidateOptions, validate_rules};
use crate::value::{StoreValue, get_value};

pub type MetaListener = Arc<dyn Fn(&Meta) + Send + Sync>;

#[derive(Default)]
struct FieldState {
    touched: bool,
    validating: bool,
    errors: Vec<ErrorMessage>,
    ticket: u64,
}

#[derive(Default)]
struct FieldShared {
    state: RwLock<FieldState>,
    listeners: RwLock<Vec<MetaListener>>,
}

impl FieldShared {
    fn meta(&self) -> Meta {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Meta {
            touched: state.touched,
            validating: state.validating,
            errors: state.errors.clone(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut FieldState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!("field state lock poisoned, continuing with the inner state");
            poisoned.into_inner()
        });
        f(&mut state)
    }

    fn begin_validation(&self) -> u64 {
        self.update(|state| {
            state.ticket += 1;
            state.validating = true;
            state.errors.clear();
            state.ticket
        })
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ticket
            == ticket
    }

    fn finish_validation(&self, ticket: u64, result: &Result<(), Vec<ErrorMessage>>) {
        let applied = self.update(|state| {
            if state.ticket != ticket {
                return false;
            }
            state.validating = false;
            state.errors = result.as_ref().err().cloned().unwrap_or_default();
            true
        });
        if applied {
            self.refresh();
        }
    }

    fn refresh(&self) {
        let meta = self.meta();
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(&meta);
        }
    }
}

/// Headless field binding: owns one name path, its rules and its meta.
pub struct Field {
    props: FieldProps,
    name_path: NamePath,
    form: WeakFormInstance,
    shared: Arc<FieldShared>,
}

impl Field {
    pub fn new(context: &FieldContext, props: FieldProps) -> Arc<Self> {
        let name_path = props
            .name
            .as_ref()
            .map(|name| context.resolve_name(name))
            .unwrap_or_default();
        Arc::new(Self {
            props,
            name_path,
            form: context.form().downgrade(),
            shared: Arc::new(FieldShared::default()),
        })
    }

    pub fn mount(self: &Arc<Self>) -> FormResult<FieldRegistration> {
        let Some(hooks) = self.form().internal_hooks(HOOK_MARK) else {
            return Ok(FieldRegistration::default());
        };
        let entity: Arc<dyn FieldEntity> = self.clone();
        Ok(FieldRegistration {
            unregister: hooks.register_field(entity)?,
        })
    }

    fn form(&self) -> FormInstance {
        self.form.upgrade().unwrap_or_default()
    }

    pub fn name(&self) -> &NamePath {
        &self.name_path
    }

    pub fn value(&self) -> FormResult<Option<StoreValue>> {
        self.form().get_field_value(self.name_path.clone())
    }

    pub fn subscribe(&self, listener: impl Fn(&Meta) + Send + Sync + 'static) -> FormResult<()> {
        write_lock(&self.shared.listeners, "subscribing to field meta")?.push(Arc::new(listener));
        Ok(())
    }

    /// Marks the field touched, writes `value` and runs `onChange` rules.
    pub fn change(&self, value: impl Into<StoreValue>) -> FormResult<()> {
        write_lock(&self.shared.state, "marking field touched")?.touched = true;
        if let Some(hooks) = self.form().internal_hooks(HOOK_MARK) {
            hooks.dispatch(ReducerAction::UpdateValue {
                name_path: self.name_path.clone(),
                value: Some(value.into()),
            })?;
        }
        self.trigger("onChange").map(|_| ())
    }

    pub fn blur(&self) -> FormResult<()> {
        self.trigger("onBlur").map(|_| ())
    }

    /// Validates this field through the form when `trigger_name` is one of
    /// its validate triggers. The returned future is optional to poll.
    pub fn trigger(&self, trigger_name: &str) -> FormResult<Option<ValidateFieldsFuture>> {
        let configured = self
            .props
            .validate_trigger
            .iter()
            .any(|trigger| trigger == trigger_name);
        if !configured || self.props.rules.is_empty() {
            return Ok(None);
        }
        let name_paths = [self.name_path.clone()];
        self.form()
            .validate_fields_with(
                Some(name_paths.as_slice()),
                ValidateOptions::default().with_trigger(trigger_name),
            )
            .map(Some)
    }

    fn read_value(&self) -> Option<StoreValue> {
        self.value().unwrap_or_else(|error| {
            tracing::warn!(%error, name_path = %self.name_path, "failed to read field value");
            None
        })
    }
}

impl FieldEntity for Field {
    fn name_path(&self) -> NamePath {
        self.name_path.clone()
    }

    fn meta(&self) -> Meta {
        self.shared.meta()
    }

    fn props(&self) -> &FieldProps {
        &self.props
    }

    fn validate_rules(
        &self,
        form: &FormInstance,
        options: &ValidateOptions,
    ) -> BoxFuture<'static, Result<(), Vec<ErrorMessage>>> {
        let ticket = self.shared.begin_validation();
        self.shared.refresh();

        let shared = self.shared.clone();
        let debounce = options
            .trigger_name
            .as_ref()
            .and(self.props.validate_debounce);

        let Some(debounce) = debounce else {
            let value = form
                .get_field_value(self.name_path.clone())
                .unwrap_or_default();
            let pending = validate_rules(
                &self.name_path,
                value.as_ref(),
                &self.props.rules,
                options,
                form,
            );
            return Box::pin(async move {
                let result = pending.await;
                shared.finish_validation(ticket, &result);
                result
            });
        };

        let name_path = self.name_path.clone();
        let rules = self.props.rules.clone();
        let options = options.clone();
        let form = form.clone();
        Box::pin(async move {
            Delay::new(debounce).await;
            if !shared.is_latest(ticket) {
                tracing::trace!(name_path = %name_path, ticket, "debounced validation superseded");
                return Ok(());
            }
            let value = form.get_field_value(name_path.clone()).unwrap_or_default();
            let result =
                validate_rules(&name_path, value.as_ref(), &rules, &options, &form).await;
            shared.finish_validation(ticket, &result);
            result
        })
    }

    fn on_store_change(
        &self,
        prev_store: &StoreValue,
        name_paths: Option<&[NamePath]>,
        info: &NotifyInfo,
    ) {
        let name_match = name_paths.is_some_and(|paths| contains_name_path(paths, &self.name_path));
        let value_changed = get_value(prev_store, &self.name_path) != self.read_value().as_ref();
        let depends_on = |paths: &[NamePath]| {
            self.props
                .dependencies
                .iter()
                .any(|dependency| contains_name_path(paths, dependency))
        };

        if value_changed
            && matches!(
                info,
                NotifyInfo::ValueUpdate {
                    source: UpdateSource::External
                }
            )
        {
            self.shared.update(|state| {
                state.touched = true;
                state.validating = false;
                state.errors.clear();
                state.ticket += 1;
            });
        }

        let refresh = match info {
            NotifyInfo::Reset if name_paths.is_none() || name_match => {
                self.shared.update(|state| {
                    state.touched = false;
                    state.validating = false;
                    state.errors.clear();
                    state.ticket += 1;
                });
                true
            }
            NotifyInfo::Reset => false,
            NotifyInfo::SetField { data } if name_match => {
                self.shared.update(|state| {
                    if let Some(touched) = data.touched {
                        state.touched = touched;
                    }
                    if let Some(validating) = data.validating {
                        state.validating = validating;
                    }
                    if let Some(errors) = &data.errors {
                        state.errors = errors.clone();
                    }
                });
                true
            }
            NotifyInfo::SetField { .. } => false,
            NotifyInfo::DependenciesUpdate { related_fields } => depends_on(related_fields),
            NotifyInfo::ValueUpdate { .. } | NotifyInfo::ErrorUpdate => {
                name_match || value_changed || name_paths.is_some_and(depends_on)
            }
        };

        if refresh {
            self.shared.refresh();
        }
    }
}

/// Keeps a mounted [`Field`] registered until dropped.
#[derive(Default)]
pub struct FieldRegistration {
    unregister: Unregister,
}

impl FieldRegistration {
    pub fn unregister(self) -> FormResult<()> {
        self.unregister.unregister()
    }
}

impl Drop for FieldRegistration {
    fn drop(&mut self) {
        if let Err(error) = self.unregister.unregister() {
            tracing::warn!(%error, "failed to unregister field");
        }
    }
}
