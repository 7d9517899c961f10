//! Domain types: device aggregate, models, errors and settings.

pub mod device;
pub mod error;
pub mod models;
pub mod settings;
