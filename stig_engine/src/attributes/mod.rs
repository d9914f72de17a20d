pub mod error;
pub mod store;

pub use error::AttributeError;
pub use store::{
    read_values_file, Attribute, AttributeOverrides, AttributeStore, ResolvedAttributes,
};
