//! Fleet registry and attribute control.
//!
//! `FleetRegistry` is the single source of truth for which torrents exist and
//! the only component that calls into the transfer engine.

mod attributes;
mod registry;
mod types;

pub use attributes::AttributeController;
pub use registry::{FleetRegistry, RegistryConfig};
pub use types::*;
