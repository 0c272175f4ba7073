//! cardvault imports character cards into a local card library.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`card`] defines the normalized card, asset, and collection shapes that
//!   every parser produces.
//! - [`import`] runs one input through detection, parsing, asset enrichment,
//!   processing, and persistence, and reports per-entity outcomes.
//! - [`storage`] declares the storage capability the import service writes
//!   through, with in-memory and directory-backed implementations.
//! - [`core`] owns user configuration.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which loads
//! configuration, sets up logging, and dispatches subcommands.

pub mod card;
pub mod cli;
pub mod core;
pub mod import;
pub mod storage;
pub mod utils;
