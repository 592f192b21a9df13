//! Benchmark crate for Loam. See `benches/` for the criterion suites;
//! this library is intentionally empty.
