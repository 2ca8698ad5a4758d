//! Capability registry wiring.
//!
//! Wraps the JSON catalog under `catalog/registry.json` so resolvers and the
//! emitter share one validated list of flags, their value domains, and the
//! section each flag is emitted in.

pub mod identity;
pub mod index;
pub mod model;

pub use identity::{FlagGroup, FlagName, FlagValue, RegistryKey, Rendering, ValueDomain};
pub use index::{CapabilityRegistry, REGISTRY_SCHEMA_VERSION};
pub use model::{CapabilityFlag, GroupSpec, RegistryFile, load_registry_from_path};
