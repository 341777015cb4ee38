//! Run configuration: JSON model, defaults and validation.

pub(crate) mod model;
