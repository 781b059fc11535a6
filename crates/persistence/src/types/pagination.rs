//! Pagination types for list operations.
//!
//! Paginated lists run against a point-in-time snapshot so that pages stay
//! consistent while documents are written concurrently. The page token handed
//! to callers is a [`PageCursor`]: the snapshot id, the index or alias the
//! snapshot was opened on, and the offset of the next page.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

const CURSOR_FORMAT_VERSION: u8 = 1;

/// Caller-facing pagination request.
///
/// A `page_size` of zero requests an unpaginated list, capped at the engine's
/// maximum page size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of items per page.
    pub page_size: u32,

    /// Token returned by the previous page, empty for the first page.
    #[serde(default)]
    pub page_token: String,
}

impl PageRequest {
    /// Requests the first page of the given size.
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            page_token: String::new(),
        }
    }

    /// Requests the page after `token`.
    pub fn next(page_size: u32, token: impl Into<String>) -> Self {
        Self {
            page_size,
            page_token: token.into(),
        }
    }

    /// Requests everything in a single page.
    pub fn unpaginated() -> Self {
        Self::default()
    }

    /// Returns true if the caller asked for pages.
    pub fn is_paginated(&self) -> bool {
        self.page_size > 0
    }
}

/// An opaque cursor into a point-in-time snapshot.
///
/// # Encoding
///
/// URL-safe unpadded base64 of a small JSON object carrying a format version,
/// the snapshot id, the listed index and the offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Cursor format version.
    version: u8,

    /// Point-in-time snapshot id.
    snapshot_id: String,

    /// Index or alias the snapshot was opened on.
    index: String,

    /// Offset of the next page within the snapshot.
    offset: u64,
}

impl PageCursor {
    /// Creates a cursor at `offset` within a snapshot of `index`.
    pub fn new(snapshot_id: impl Into<String>, index: impl Into<String>, offset: u64) -> Self {
        Self {
            version: CURSOR_FORMAT_VERSION,
            snapshot_id: snapshot_id.into(),
            index: index.into(),
            offset,
        }
    }

    /// Returns the snapshot id.
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    /// Returns the index or alias the snapshot was opened on.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Returns the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, SearchError> {
        let invalid = || SearchError::InvalidPageToken {
            token: s.to_string(),
        };

        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if cursor.version != CURSOR_FORMAT_VERSION
            || cursor.snapshot_id.is_empty()
            || cursor.index.is_empty()
        {
            return Err(invalid());
        }
        Ok(cursor)
    }

    /// Decodes a cursor and checks it was issued for `index`.
    pub fn decode_for(s: &str, index: &str) -> Result<Self, SearchError> {
        let cursor = Self::decode(s)?;
        if cursor.index != index {
            return Err(SearchError::InvalidPageToken {
                token: s.to_string(),
            });
        }
        Ok(cursor)
    }
}

/// A page of list results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,

    /// Token for the next page, `None` on the last page.
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a new page.
    pub fn new(items: Vec<T>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token,
        }
    }

    /// Creates an empty last page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_token: None,
        }
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if another page follows.
    pub fn has_next(&self) -> bool {
        self.next_page_token.is_some()
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = PageCursor::new("46ToAwMDaWR5", "grafeas-acme-notes", 40);
        let token = cursor.encode();
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert_eq!(PageCursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        for token in ["not base64!", "", "e30"] {
            let err = PageCursor::decode(token).unwrap_err();
            assert!(matches!(err, SearchError::InvalidPageToken { .. }), "{token}");
        }
    }

    #[test]
    fn test_cursor_rejects_unknown_version() {
        let json = br#"{"version":9,"snapshot_id":"pit","index":"grafeas-projects","offset":0}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert!(PageCursor::decode(&token).is_err());
    }

    #[test]
    fn test_cursor_bound_to_index() {
        let token = PageCursor::new("pit", "grafeas-alpha-notes", 1).encode();
        assert_eq!(
            PageCursor::decode_for(&token, "grafeas-alpha-notes").unwrap().offset(),
            1
        );
        let err = PageCursor::decode_for(&token, "grafeas-beta-notes").unwrap_err();
        assert!(matches!(err, SearchError::InvalidPageToken { .. }));
    }

    #[test]
    fn test_page_request() {
        assert!(!PageRequest::unpaginated().is_paginated());
        assert!(PageRequest::first(10).is_paginated());
        assert_eq!(PageRequest::next(5, "abc").page_token, "abc");
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2, 3], Some("next".to_string()));
        let mapped = page.map(|n| n * 2);
        assert_eq!(mapped.items, vec![2, 4, 6]);
        assert!(mapped.has_next());
        assert!(Page::<u8>::empty().is_empty());
    }
}
