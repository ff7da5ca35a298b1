//! Lazy pagination over delegate results.
//!
//! [`Pages`] drives the token protocol shared by queries and log retrieval: fetch a
//! page, hand out its items, and only when they are all consumed follow
//! `next_token` to the next page. [`StreamPages`] drives the tailing variant, where
//! a page says whether more data is buffered right now (`has_next`) and carries a
//! `last_read` cursor the caller can keep to resume later.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::ApiError;

/// One page of results plus the token for the next page, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl<T> PaginatedList<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }
}

/// One batch of streamed results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedList<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read: Option<String>,
}

impl<T> StreamedList<T> {
    pub fn new(items: Vec<T>, has_next: bool, last_read: Option<String>) -> Self {
        Self {
            items,
            has_next,
            last_read,
        }
    }
}

pub type PageFetcher<T> =
    Box<dyn FnMut(Option<&str>) -> Result<PaginatedList<T>, ApiError> + Send>;

pub type StreamFetcher<T> =
    Box<dyn FnMut(Option<&str>) -> Result<StreamedList<T>, ApiError> + Send>;

enum Cursor {
    Start(Option<String>),
    Next(String),
    Exhausted,
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

/// Single-pass iterator over every item of every page.
///
/// Yields an error at most once; iteration ends after it.
pub struct Pages<T> {
    fetch: PageFetcher<T>,
    buffer: VecDeque<T>,
    cursor: Cursor,
}

impl<T> Pages<T> {
    /// Start from `start_token` (usually `None`). Nothing is fetched until the first
    /// call to `next`.
    pub fn new(start_token: Option<String>, fetch: PageFetcher<T>) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            cursor: Cursor::Start(start_token),
        }
    }
}

impl<T> Iterator for Pages<T> {
    type Item = Result<T, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            let token = match std::mem::replace(&mut self.cursor, Cursor::Exhausted) {
                Cursor::Exhausted => return None,
                Cursor::Start(token) => token,
                Cursor::Next(token) => Some(token),
            };

            tracing::debug!(token = ?token, "Fetching page");
            match (self.fetch)(token.as_deref()) {
                Ok(page) => {
                    self.buffer.extend(page.items);
                    if let Some(next) = non_empty(page.next_token) {
                        self.cursor = Cursor::Next(next);
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Single-pass iterator over streamed batches.
///
/// Stops once a batch reports `has_next == false` or comes back without a
/// `last_read` cursor; a cursor-less batch leaves the previous cursor in place.
/// The final cursor is available from [`StreamPages::last_read`] only after the
/// iterator is exhausted.
pub struct StreamPages<T> {
    fetch: StreamFetcher<T>,
    buffer: VecDeque<T>,
    last_read: Option<String>,
    finished: bool,
    exhausted: bool,
}

impl<T> StreamPages<T> {
    pub fn new(last_read: Option<String>, fetch: StreamFetcher<T>) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            last_read: non_empty(last_read),
            finished: false,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Cursor to resume from, once every item has been consumed.
    pub fn last_read(&self) -> Option<&str> {
        if self.exhausted {
            self.last_read.as_deref()
        } else {
            None
        }
    }

    /// Drain the remaining items and return the final cursor.
    pub fn finish(mut self) -> Result<Option<String>, ApiError> {
        for item in self.by_ref() {
            item?;
        }
        Ok(self.last_read)
    }
}

impl<T> Iterator for StreamPages<T> {
    type Item = Result<T, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                self.exhausted = true;
                return None;
            }

            tracing::debug!(last_read = ?self.last_read, "Fetching streamed batch");
            match (self.fetch)(self.last_read.as_deref()) {
                Ok(batch) => {
                    self.buffer.extend(batch.items);
                    // A batch without a cursor ends the stream but keeps the resume point.
                    match non_empty(batch.last_read) {
                        Some(cursor) => {
                            self.last_read = Some(cursor);
                            if !batch.has_next {
                                self.finished = true;
                            }
                        }
                        None => self.finished = true,
                    }
                }
                Err(e) => {
                    self.finished = true;
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
