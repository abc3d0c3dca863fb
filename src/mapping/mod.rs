//! SQL command mappings.
//!
//! - [`model`]: `Command`, `CommandKind`, `Mapping`, and the `CommandSource` capability
//! - [`loader`]: parallel directory loader for mapping files
//! - [`registry`]: concurrent owner-type-name → mapping map

pub mod loader;
pub mod model;
pub mod registry;

pub use loader::{
    DEFAULT_MAPPING_EXTENSION, LoadPolicy, LoadReport, MappingLoader, SkippedFile,
    parse_mapping_file, parse_mapping_str,
};
pub use model::{Command, CommandKind, CommandSource, Mapping};
pub use registry::MappingRegistry;
