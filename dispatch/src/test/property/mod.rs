//! Property-based tests for dispatch.
