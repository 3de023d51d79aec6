pub mod form;
pub mod name_map;
pub mod name_path;
pub mod prelude;
pub mod validation;
pub mod value;

#[cfg(test)]
mod test_public_api;

pub use form::{FormInstance, FormStore};
pub use name_path::NamePath;
pub use value::StoreValue;
