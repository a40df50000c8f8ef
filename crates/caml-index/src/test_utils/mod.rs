// test_utils/mod.rs - shared fixtures for tests and benchmarks

pub mod fixture_workspace;
