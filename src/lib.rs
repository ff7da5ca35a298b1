//! Roboto: client library for the action invocation lifecycle.
//!
//! An [`actions::Invocation`] is a snapshot of one remote execution of an action.
//! Its status history is an append-only ledger; every read is a projection of that
//! ledger and every state change goes through an [`actions::InvocationDelegate`].

pub mod actions;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pagination;
pub mod query;
