//! Query validation and lazy pagination of results.

use roboto::actions::InvocationStatus::*;
use roboto::actions::Invocation;
use roboto::error::ApiError;
use roboto::pagination::PaginatedList;
use roboto::query::{Comparator, Condition, QuerySpecification, SortDirection};
use std::sync::Arc;

use super::test_utils::{record_with, ScriptedDelegate};

#[test]
fn unknown_field_fails_before_any_call() {
    let delegate = Arc::new(ScriptedDelegate::new());
    let query = QuerySpecification::new()
        .with_condition(Condition::new("not_a_field", Comparator::Equals, "x"));

    let result = Invocation::query(query, delegate.clone(), None);

    match result {
        Err(ApiError::InvalidRequest(message)) => {
            assert!(message.contains("not_a_field"));
            assert!(message.contains("Invocation"));
        }
        other => panic!("expected InvalidRequest, got {:?}", other.err()),
    }
    assert!(delegate.calls.lock().is_empty());
}

#[test]
fn unknown_sort_field_fails_before_any_call() {
    let delegate = Arc::new(ScriptedDelegate::new());
    let query = QuerySpecification::new().sorted_by("bogus", SortDirection::Ascending);
    assert!(Invocation::query(query, delegate.clone(), None).is_err());
    assert!(delegate.calls.lock().is_empty());
}

#[test]
fn dotted_fields_are_checked_on_first_segment() {
    let delegate = Arc::new(
        ScriptedDelegate::new().with_query_pages(vec![PaginatedList::new(Vec::new(), None)]),
    );
    let query = QuerySpecification::new().with_condition(Condition::new(
        "provenance.action.name",
        Comparator::Equals,
        "ingest",
    ));

    let results: Vec<_> = Invocation::query(query, delegate.clone(), None)
        .unwrap()
        .collect();

    assert!(results.is_empty());
    assert_eq!(delegate.calls_named("query_invocations"), 1);
}

#[test]
fn three_pages_are_fetched_lazily_in_order() {
    let pages = vec![
        PaginatedList::new(
            vec![record_with("a", &[Queued]), record_with("b", &[Queued])],
            Some("A".to_string()),
        ),
        PaginatedList::new(vec![record_with("c", &[Queued])], Some("B".to_string())),
        PaginatedList::new(
            vec![record_with("d", &[Queued]), record_with("e", &[Completed])],
            None,
        ),
    ];
    let delegate = Arc::new(ScriptedDelegate::new().with_query_pages(pages));
    let mut results = Invocation::query(QuerySpecification::new(), delegate.clone(), None).unwrap();

    assert_eq!(delegate.calls_named("query_invocations"), 0);
    assert_eq!(results.next().unwrap().unwrap().id(), "a");
    assert_eq!(delegate.calls_named("query_invocations"), 1);
    assert_eq!(results.next().unwrap().unwrap().id(), "b");
    assert_eq!(delegate.calls_named("query_invocations"), 1);
    assert_eq!(results.next().unwrap().unwrap().id(), "c");
    assert_eq!(delegate.calls_named("query_invocations"), 2);

    let rest: Vec<String> = results.map(|r| r.unwrap().id().to_string()).collect();
    assert_eq!(rest, vec!["d", "e"]);
    assert_eq!(
        delegate.query_tokens.lock().as_slice(),
        &[None, Some("A".to_string()), Some("B".to_string())]
    );
}

#[test]
fn query_error_ends_iteration() {
    // No scripted pages: the first fetch fails.
    let delegate = Arc::new(ScriptedDelegate::new());
    let mut results = Invocation::query(QuerySpecification::new(), delegate, None).unwrap();
    assert!(matches!(results.next(), Some(Err(ApiError::Transport(_)))));
    assert!(results.next().is_none());
}
