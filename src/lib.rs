//! Open Liberty Operator
//!
//! Reconciles `OpenLibertyApplication` resources into the Deployments,
//! StatefulSets, Services, Routes, autoscalers, ServiceMonitors, Knative
//! Services and binding Secrets that run the application.

pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
#[cfg(feature = "metrics")]
pub mod server;
pub mod telemetry;
pub mod util;

pub use error::{Error, Result};
