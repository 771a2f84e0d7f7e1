//! Shared types, error model, and configuration for the BMEcat builder.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`BmecatError`], the unified error type
//! - Domain types ([`HeaderConfig`], [`NormalizedRow`], [`FieldMapping`], [`CatalogGroup`])
//! - Configuration ([`AppConfig`], [`AssemblyConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssemblyConfig, DefaultsConfig, OpenRouterConfig, PricingConfig, StorageConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    spec_db_path,
};
pub use error::{BmecatError, Result, TemplateContractError};
pub use types::{
    BmecatField, BmecatFormat, CatalogGroup, Feature, FeatureMapping, FieldMapping, HeaderConfig,
    NormalizedRow, SpecId, SpecKind, StoredSpecification, StructureRow, TemplateKind,
};
