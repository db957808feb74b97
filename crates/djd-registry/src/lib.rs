//! DJD Registry - Persistent store for registered devices
//!
//! Three tables back the registry:
//! - `device`: one row per registered device, keyed by its derived identifier
//! - `power_strip`: one row per switch of a power strip, cascading on device delete
//! - `printer_host`: one row per 3D-printer host, keyed by its API key
//!
//! Every write is a single statement committed on its own. Store errors are
//! logged here with the failing operation and returned as [`RegistryError`];
//! absence is reported as `None`/`false`, never as an error.

pub mod schema;
pub mod store;

pub use store::{Registry, RegistryError};
