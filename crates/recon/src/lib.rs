//! `fieldkit-recon`: overlap resolution and attribute merge-policy engine.
//!
//! Pure engine crate: receives pre-loaded records (or CSV/TOML text), returns
//! decisions, reports and explicit write commands. No CLI or filesystem
//! dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod merge;
pub mod model;
pub mod plan;
pub mod resolve;
pub mod select;
pub mod spatial_join;
pub mod store;
pub mod table;
pub mod unique;
pub mod validate;
pub mod value;
pub mod zones;

pub use config::{MergeConfig, ResolveConfig, SelectConfig, SpatialJoinConfig, ZonesConfig};
pub use engine::{run_resolve, run_select, run_unique, run_zones, MergeJob};
pub use error::ReconError;
pub use merge::merge;
pub use model::{FieldPlan, MergeReport, OverwritePolicy, RecordId, Resolution, WriteCommand};
pub use resolve::{resolve, resolve_all, GeometryEngine};
pub use store::{apply_writes, AttributeStore, MemoryStore};
pub use validate::{validate, ValidationResult};
pub use value::{FieldType, FieldValue};
