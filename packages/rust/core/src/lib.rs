//! Catalog generation for BMEcat.
//!
//! This crate turns normalized product rows and catalog-structure rows into a
//! BMEcat 1.2 or 2005 document, either with the fixed classic layout or from
//! templates a [`oracle::TemplatingOracle`] derives from specification files.
//! [`pipeline::run_generation`] ties parsing, mapping and assembly together.

pub mod assembler;
pub mod groups;
pub mod openrouter;
pub mod oracle;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod splice;
pub mod suggest;
pub mod template;
pub mod xml;
