use super::FormInstance;
use crate::name_path::NamePath;

/// What a field binding receives from its enclosing form.
///
/// `FieldContext::default()` carries the detached instance, so a field
/// created outside any form still works and only logs warnings.
#[derive(Clone, Default)]
pub struct FieldContext {
    form: FormInstance,
    prefix_name: NamePath,
}

impl FieldContext {
    pub fn new(form: FormInstance) -> Self {
        Self {
            form,
            prefix_name: NamePath::root(),
        }
    }

    pub fn form(&self) -> &FormInstance {
        &self.form
    }

    pub fn prefix_name(&self) -> &NamePath {
        &self.prefix_name
    }

    /// Nested context whose fields live under `prefix`.
    pub fn with_prefix(&self, prefix: impl Into<NamePath>) -> Self {
        Self {
            form: self.form.clone(),
            prefix_name: self.prefix_name.join(&prefix.into()),
        }
    }

    pub fn resolve_name(&self, name: &NamePath) -> NamePath {
        self.prefix_name.join(name)
    }
}
