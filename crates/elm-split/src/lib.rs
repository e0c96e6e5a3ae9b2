//! Split a multi-program Elm bundle into one ES module per program plus a
//! module holding the code the programs share.

pub mod ambient_globals;
pub mod chunk_assembler;
pub mod config;
pub mod dependency_map;
pub mod entry_points;
pub mod error;
pub mod graph_builder;
pub mod orchestrator;
pub mod reachability;
pub mod report;
pub mod split_plan;
pub mod syntax;
pub mod types;
pub mod visitors;

pub use crate::{
    config::Config,
    error::{Result, SplitError},
    orchestrator::{OutputModule, SplitOutcome, SplitResult, Splitter},
};
