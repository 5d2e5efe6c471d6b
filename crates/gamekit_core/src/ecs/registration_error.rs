use crate::ecs::{Modifiers, StorageClass};
use thiserror::Error;

/// Errors that can occur while registering a component.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("component '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("cannot register '{name}': {storage} storage is limited to {max} components")]
    TooManyComponents {
        name: String,
        storage: StorageClass,
        max: usize,
    },

    #[error("component '{name}' uses unsupported modifiers {modifiers:?} for {storage} storage")]
    UnsupportedModifiers {
        name: String,
        storage: StorageClass,
        modifiers: Modifiers,
    },

    #[error("component '{name}' requests alignment {align}, at most {max} is supported")]
    AlignmentTooLarge { name: String, align: usize, max: usize },

    #[error("tag component '{name}' must not carry a payload ({size} bytes)")]
    TaggedPayload { name: String, size: usize },
}
