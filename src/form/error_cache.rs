use super::FieldError;
use crate::name_map::NameMap;
use crate::name_path::{NamePath, contains_name_path};
use crate::validation::ErrorMessage;

#[derive(Clone, Debug, Default)]
pub(crate) struct ErrorCache {
    cache: NameMap<Vec<ErrorMessage>>,
}

impl ErrorCache {
    /// Writes into a fresh copy so earlier clones keep their view.
    pub(crate) fn update_error(&mut self, field_errors: impl IntoIterator<Item = FieldError>) {
        let mut next = self.cache.clone();
        for FieldError { name, errors } in field_errors {
            next.set(name, errors);
        }
        self.cache = next;
    }

    pub(crate) fn get_fields_error(&self, name_paths: Option<&[NamePath]>) -> Vec<FieldError> {
        self.cache
            .iter()
            .filter(|entry| name_paths.is_none_or(|paths| contains_name_path(paths, &entry.key)))
            .map(|entry| FieldError {
                name: entry.key.clone(),
                errors: entry.value.clone(),
            })
            .collect()
    }

    pub(crate) fn reset_field(&mut self, name_path: &NamePath) {
        self.cache.delete(name_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_error(name: &str, errors: &[&str]) -> FieldError {
        FieldError {
            name: NamePath::from(name),
            errors: errors.iter().map(|error| error.to_string()).collect(),
        }
    }

    #[test]
    fn snapshots_do_not_observe_later_updates() {
        let mut cache = ErrorCache::default();
        cache.update_error([field_error("a", &["bad"])]);
        let snapshot = cache.clone();
        cache.update_error([field_error("a", &[]), field_error("b", &["worse"])]);

        assert_eq!(snapshot.get_fields_error(None), vec![field_error("a", &["bad"])]);
        assert_eq!(
            cache.get_fields_error(Some(&[NamePath::from("b")])),
            vec![field_error("b", &["worse"])]
        );
    }

    #[test]
    fn reset_field_drops_the_entry() {
        let mut cache = ErrorCache::default();
        cache.update_error([field_error("a", &["bad"]), field_error("b", &["worse"])]);
        cache.reset_field(&NamePath::from("a"));
        assert_eq!(cache.get_fields_error(None), vec![field_error("b", &["worse"])]);
    }
}
