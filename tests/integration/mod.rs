//! Integration tests for the Roboto invocation client

mod config_integration;
mod http_delegate;
mod query_pagination;
mod test_utils;
