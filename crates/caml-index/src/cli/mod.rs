// cli/mod.rs - command-line entry points

pub mod query;
