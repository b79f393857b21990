// Test modules for rpc-partitioning crate
//
// Each source file has a corresponding test file that focuses on business
// logic verification.

// Test helper utilities
pub mod helpers;

pub mod filter;
pub mod merger;

// NOTE: End-to-end scenarios through the public API live in tests/
