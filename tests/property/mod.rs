//! Property-based tests for the status ledger
