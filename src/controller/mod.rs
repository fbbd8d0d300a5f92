//! Controller module for OpenLibertyApplication reconciliation
//!
//! The customize functions and helpers here are pure and synchronous; the
//! reconciler drives them against the cluster.

mod binding;
mod conditions;
#[cfg(feature = "metrics")]
pub mod metrics;
mod owner_ref;
mod quantity;
mod reconciler;
mod resource_meta;
pub mod resources;
mod validation;

pub use binding::{build_service_binding_secret_name, find_consumes, normalize_env_variable_name};
pub use conditions::{get_condition, set_condition, update_condition};
pub use owner_ref::{ensure_owner_ref, owner_reference, shared_owner_reference};
pub use quantity::parse_quantity;
pub use reconciler::{run_controller, Capabilities, ControllerState};
pub use resource_meta::{merge_maps, merge_optional_maps};
pub use resources::*;
pub use validation::validate;
