//! Integration tests for the Fluxo queue engine live under `tests/`.
//! This crate intentionally exports nothing.
