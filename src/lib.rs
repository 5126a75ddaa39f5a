//! # cmodel
//!
//! An element model for C/C++ projects: folders, translation units,
//! binaries and archives, and the functions and variables read from their
//! symbol tables.
//!
//! ## Architecture
//!
//! - **element**: Immutable handles identifying a position in the model tree
//! - **info**: Mutable per-element state (children, stamps, binary details)
//! - **lru**: Bounded LRU cache with an overflow margin and a close policy
//! - **cache**: Element info cache, tiered by element kind
//! - **store**: Resource access (memory-mapped reads, stamps, listings)
//! - **reader**: ELF object and `ar` archive introspection
//! - **loader**: Turns object images into binary/archive structure
//! - **manager**: The model service: lazy opening, staleness, projects
//! - **runner**: Background discovery of a project's binaries
//! - **scan**: Project walking and binary sniffing
//! - **operations**: Multi-element copy, move and delete
//! - **view**: Typed views and capability traits over handles
//! - **index**: Persistent binary summaries using LMDB
//! - **error**: Model errors with status codes

pub mod cache;
pub mod cli;
pub mod config;
pub mod element;
pub mod error;
pub mod index;
pub mod info;
pub mod loader;
pub mod lru;
pub mod manager;
pub mod operations;
pub mod reader;
pub mod runner;
pub mod scan;
pub mod store;
pub mod view;
