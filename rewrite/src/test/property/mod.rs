//! Property-based tests for the standard rewrites.
