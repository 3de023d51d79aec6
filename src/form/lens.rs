use serde::Serialize;
use serde::de::DeserializeOwned;

use super::store::{FormError, FormResult};
use crate::name_path::NamePath;
use crate::value::StoreValue;

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn name_path(self) -> NamePath;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

pub trait FormModel: Sized {
    type Fields;

    fn fields() -> Self::Fields;

    fn to_store(&self) -> FormResult<StoreValue>
    where
        Self: Serialize,
    {
        serde_json::to_value(self)
            .map(StoreValue::from)
            .map_err(|error| FormError::ValueConversion {
                name_path: NamePath::root(),
                message: error.to_string(),
            })
    }

    fn from_store(store: &StoreValue) -> FormResult<Self>
    where
        Self: DeserializeOwned,
    {
        serde_json::from_value(store.to_json()).map_err(|error| FormError::ValueConversion {
            name_path: NamePath::root(),
            message: error.to_string(),
        })
    }
}
