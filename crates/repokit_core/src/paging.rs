//! Paging and slicing over bound queries.
//!
//! # Responsibility
//! - Window a query with `OFFSET page*size LIMIT size` plus ordering.
//! - Build `Page` (with a separate count query) and `Slice` (probe row,
//!   no count) result values.
//!
//! # Invariants
//! - `total_pages == ceil(total_elements / page_size)` and
//!   `content.len() <= page_size`.
//! - `Slice::has_next` is decided by fetching `page_size + 1` rows.
//! - Page content and total are read by two independent statements. Under
//!   concurrent writers they may disagree; no snapshot is taken.

use crate::model::entity::Record;
use crate::query::sort::Sort;
use crate::query::{BoundQuery, Window};
use crate::repo::{RepoError, RepoResult};
use crate::session::PersistenceSession;
use log::debug;
use serde::Serialize;
use std::time::Instant;

/// Zero-based page index, page size and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    size: u64,
    sort: Sort,
}

impl PageRequest {
    /// Fails with `InvalidArgument` when `size` is zero.
    pub fn of(page: u64, size: u64, sort: Sort) -> RepoResult<Self> {
        if size == 0 {
            return Err(RepoError::InvalidArgument(
                "page size must be greater than zero".to_string(),
            ));
        }
        Ok(Self { page, size, sort })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    /// Request for the following page with the same size and ordering.
    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            size: self.size,
            sort: self.sort.clone(),
        }
    }

    fn window(&self) -> Window {
        Window {
            offset: self.offset(),
            limit: self.size,
        }
    }

    fn probe_window(&self) -> Window {
        Window {
            offset: self.offset(),
            limit: self.size.saturating_add(1),
        }
    }
}

/// Bounded result window with total-count metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    page_number: u64,
    page_size: u64,
    total_elements: u64,
    total_pages: u64,
    is_first: bool,
    is_last: bool,
    has_next: bool,
}

impl<T> Page<T> {
    /// Content beyond the page size is dropped.
    pub fn new(mut content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        content.truncate(usize::try_from(request.size).unwrap_or(usize::MAX));
        let total_pages = total_elements.div_ceil(request.size);
        let has_next = request.page.saturating_add(1) < total_pages;
        Self {
            content,
            page_number: request.page,
            page_size: request.size,
            total_elements,
            total_pages,
            is_first: request.page == 0,
            is_last: !has_next,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.content.iter()
    }

    /// Transforms every element eagerly; all metadata is kept.
    pub fn map<U>(self, transform: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(transform).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            is_first: self.is_first,
            is_last: self.is_last,
            has_next: self.has_next,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}

/// Bounded result window without a total count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice<T> {
    content: Vec<T>,
    page_number: u64,
    page_size: u64,
    is_first: bool,
    has_next: bool,
}

impl<T> Slice<T> {
    /// Builds a slice from a probe fetch of up to `size + 1` rows.
    pub fn from_probe(mut rows: Vec<T>, request: &PageRequest) -> Self {
        let has_next = drop_probe_row(&mut rows, request);
        Self::new(rows, request, has_next)
    }

    fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        Self {
            content,
            page_number: request.page,
            page_size: request.size,
            is_first: request.page == 0,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.content.iter()
    }

    pub fn map<U>(self, transform: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(transform).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            is_first: self.is_first,
            has_next: self.has_next,
        }
    }
}

impl<T> IntoIterator for Slice<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}

/// Reads one page of `query` plus its total count.
///
/// `columns` restricts the select list (projections); `map_row` turns each
/// row into the content element and may consult the session.
pub fn fetch_page<S, T, F>(
    session: &mut S,
    query: &BoundQuery,
    request: &PageRequest,
    columns: Option<&[&str]>,
    mut map_row: F,
) -> RepoResult<Page<T>>
where
    S: PersistenceSession,
    F: FnMut(&mut S, Record) -> RepoResult<T>,
{
    let started_at = Instant::now();
    let select = query.select_columns(columns, request.sort(), Some(request.window()))?;
    let rows = session.execute_query(&select)?;
    let mut content = Vec::with_capacity(rows.len());
    for row in rows {
        content.push(map_row(session, row)?);
    }
    let total_elements = session.execute_count(&query.count())?;
    let page = Page::new(content, request, total_elements);

    debug!(
        "event=page_fetch module=paging status=ok page={} size={} rows={} total={} duration_ms={}",
        page.page_number,
        page.page_size,
        page.content.len(),
        page.total_elements,
        started_at.elapsed().as_millis()
    );
    Ok(page)
}

/// Reads one slice of `query` using a `size + 1` probe; no count query.
pub fn fetch_slice<S, T, F>(
    session: &mut S,
    query: &BoundQuery,
    request: &PageRequest,
    columns: Option<&[&str]>,
    mut map_row: F,
) -> RepoResult<Slice<T>>
where
    S: PersistenceSession,
    F: FnMut(&mut S, Record) -> RepoResult<T>,
{
    let started_at = Instant::now();
    let select = query.select_columns(columns, request.sort(), Some(request.probe_window()))?;
    let mut rows = session.execute_query(&select)?;
    // The probe row is dropped before mapping so it never enters the
    // identity map.
    let has_next = drop_probe_row(&mut rows, request);

    let mut content = Vec::with_capacity(rows.len());
    for row in rows {
        content.push(map_row(session, row)?);
    }
    let slice = Slice::new(content, request, has_next);

    debug!(
        "event=slice_fetch module=paging status=ok page={} size={} rows={} has_next={} duration_ms={}",
        slice.page_number,
        slice.page_size,
        slice.content.len(),
        slice.has_next,
        started_at.elapsed().as_millis()
    );
    Ok(slice)
}

/// Truncates a probe fetch to the page size; returns whether a further
/// row existed.
fn drop_probe_row<T>(rows: &mut Vec<T>, request: &PageRequest) -> bool {
    let size = usize::try_from(request.size).unwrap_or(usize::MAX);
    let has_next = rows.len() > size;
    rows.truncate(size);
    has_next
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRequest, Slice};
    use crate::query::sort::Sort;
    use crate::repo::RepoError;

    fn request(page: u64, size: u64) -> PageRequest {
        PageRequest::of(page, size, Sort::unsorted()).unwrap()
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = PageRequest::of(0, 0, Sort::unsorted()).unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }

    #[test]
    fn page_metadata_follows_total_count() {
        let page = Page::new(vec![1, 2, 3], &request(0, 3), 6);
        assert_eq!(page.total_pages(), 2);
        assert!(page.is_first());
        assert!(page.has_next());
        assert!(!page.is_last());

        let last = Page::new(vec![4, 5, 6], &request(1, 3), 6);
        assert!(!last.is_first());
        assert!(!last.has_next());
        assert!(last.is_last());
    }

    #[test]
    fn page_with_no_rows_has_zero_pages() {
        let page: Page<i32> = Page::new(Vec::new(), &request(0, 10), 0);
        assert_eq!(page.total_pages(), 0);
        assert!(page.is_first());
        assert!(page.is_last());
        assert!(!page.has_next());
    }

    #[test]
    fn page_truncates_oversized_content() {
        let page = Page::new(vec![1, 2, 3, 4], &request(0, 3), 7);
        assert_eq!(page.content(), &[1, 2, 3]);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::new(vec![1, 2], &request(2, 2), 5).map(|value| value * 10);
        assert_eq!(page.content(), &[10, 20]);
        assert_eq!(page.page_number(), 2);
        assert_eq!(page.total_pages(), 3);
        assert!(page.is_last());
    }

    #[test]
    fn slice_uses_probe_row() {
        let slice = Slice::from_probe(vec![1, 2, 3, 4], &request(0, 3));
        assert_eq!(slice.content(), &[1, 2, 3]);
        assert!(slice.has_next());

        let tail = Slice::from_probe(vec![4, 5, 6], &request(1, 3));
        assert!(!tail.has_next());
        assert!(!tail.is_first());
    }
}
