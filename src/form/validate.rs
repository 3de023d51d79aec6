use std::sync::PoisonError;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, join_all};

use super::entity::{FieldError, NotifyInfo, ValidateErrorEntity};
use super::store::{FormResult, FormStore, ValidationTicket, write_lock};
use crate::name_path::{NamePath, contains_name_path};
use crate::validation::ValidateOptions;
use crate::value::StoreValue;

pub type ValidateFieldsFuture = BoxFuture<'static, Result<StoreValue, ValidateErrorEntity>>;

/// Outcome of a cycle, judged when it settles rather than when it is awaited.
struct SettledCycle {
    failed: bool,
    latest: bool,
    values: StoreValue,
    field_errors: Vec<FieldError>,
}

impl FormStore {
    /// Starts a validation cycle over the named fields, or every field with
    /// rules when `name_list` is `None`.
    ///
    /// Errors are cleared and each entity's rules are started before this
    /// returns. The cycle settles on the spawner whether or not the returned
    /// future is polled.
    pub(crate) fn validate_fields(
        &self,
        name_list: Option<&[NamePath]>,
        options: ValidateOptions,
    ) -> FormResult<ValidateFieldsFuture> {
        let (entities, options) = {
            let mut state = write_lock(&self.state, "clearing errors before validation")?;
            match name_list {
                Some(paths) => state.error_cache.update_error(paths.iter().map(|name| {
                    FieldError {
                        name: name.clone(),
                        errors: Vec::new(),
                    }
                })),
                None => state.error_cache = Default::default(),
            }
            let options = ValidateOptions {
                validate_messages: options
                    .validate_messages
                    .or_else(|| state.validate_messages.clone()),
                ..options
            };
            (state.field_entities.clone(), options)
        };

        let form = self.form();
        let pending = entities
            .iter()
            .filter(|entity| !entity.props().rules.is_empty())
            .filter_map(|entity| {
                let name_path = entity.name_path();
                if name_list.is_some_and(|paths| !contains_name_path(paths, &name_path)) {
                    return None;
                }
                let validation = entity.validate_rules(&form, &options);
                Some(validation.map(move |result| (name_path, result)))
            })
            .collect::<Vec<_>>();

        let ticket = write_lock(&self.state, "issuing validation ticket")?.issue_ticket();
        tracing::debug!(
            ticket = ticket.0,
            fields = pending.len(),
            trigger = options.trigger_name.as_deref().unwrap_or("none"),
            "validation issued"
        );

        let (sender, receiver) = oneshot::channel();
        let store = self.clone();
        self.spawner.spawn_validation(Box::pin(async move {
            let results = join_all(pending).await;
            let failed = results.iter().any(|(_, result)| result.is_err());
            let field_errors = results
                .into_iter()
                .map(|(name, result)| FieldError {
                    name,
                    errors: result.err().unwrap_or_default(),
                })
                .collect::<Vec<_>>();
            let (values, latest) = store
                .settle_validation(ticket, &field_errors)
                .unwrap_or_else(|error| {
                    tracing::error!(%error, ticket = ticket.0, "failed to settle validation");
                    store.settled_view(ticket)
                });
            let _ = sender.send(SettledCycle {
                failed,
                latest,
                values,
                field_errors,
            });
        }));

        let store = self.clone();
        Ok(Box::pin(async move {
            let cycle = match receiver.await {
                Ok(cycle) => cycle,
                Err(_) => {
                    tracing::warn!(ticket = ticket.0, "validation task dropped before settling");
                    let (values, latest) = store.settled_view(ticket);
                    SettledCycle {
                        failed: true,
                        latest,
                        values,
                        field_errors: Vec::new(),
                    }
                }
            };
            if !cycle.failed && cycle.latest {
                return Ok(cycle.values);
            }
            Err(ValidateErrorEntity {
                values: cycle.values,
                error_fields: cycle
                    .field_errors
                    .into_iter()
                    .filter(|field| !field.errors.is_empty())
                    .collect(),
                out_of_date: !cycle.latest,
            })
        }))
    }

    /// Store snapshot and whether `ticket` is still the newest, read under one lock.
    fn settled_view(&self, ticket: ValidationTicket) -> (StoreValue, bool) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.store.clone(), state.last_validation == Some(ticket))
    }

    /// Writes the cycle's errors and judges it against the newest ticket
    /// under the same lock, then notifies.
    fn settle_validation(
        &self,
        ticket: ValidationTicket,
        field_errors: &[FieldError],
    ) -> FormResult<(StoreValue, bool)> {
        let (store, latest) = {
            let mut state = write_lock(&self.state, "writing validation results")?;
            state.error_cache.update_error(field_errors.iter().cloned());
            (state.store.clone(), state.last_validation == Some(ticket))
        };
        let name_paths = field_errors
            .iter()
            .map(|field| field.name.clone())
            .collect::<Vec<_>>();
        tracing::debug!(ticket = ticket.0, latest, "validation settled");

        self.notify_observers(&store, Some(name_paths.as_slice()), &NotifyInfo::ErrorUpdate)?;
        self.trigger_on_fields_change(&name_paths)?;
        Ok((store, latest))
    }
}
