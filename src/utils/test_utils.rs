//! Test utilities for VM testing.
