//! Marker-based pagination
//!
//! IAM listings return a page of items plus an optional continuation marker.
//! [`drain_pages`] is the only place that follows markers: it keeps
//! fetching until no marker is returned and only then hands back the
//! collected items, so callers always act on a complete listing.

use crate::aws::error::AwsError;
use std::future::Future;
use tracing::debug;

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation marker; `None` on the last page
    pub marker: Option<String>,
}

impl<T> Page<T> {
    /// A final page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            marker: None,
        }
    }

    /// Build a page from an SDK response's truncation flag and marker.
    pub fn from_response(items: Vec<T>, is_truncated: bool, marker: Option<&str>) -> Self {
        Self {
            items,
            marker: if is_truncated {
                marker.map(str::to_string)
            } else {
                None
            },
        }
    }
}

/// Fetch every page of a listing, starting with no marker.
///
/// Fails with the first page error. A service that returns the same marker
/// twice in a row is reported as an internal error instead of looping.
pub async fn drain_pages<T, F, Fut>(listing: &str, mut fetch: F) -> Result<Vec<T>, AwsError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, AwsError>>,
{
    let mut items = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(marker.clone()).await?;
        pages += 1;
        items.extend(page.items);

        match page.marker {
            Some(next) if marker.as_deref() == Some(next.as_str()) => {
                return Err(AwsError::Internal {
                    code: None,
                    detail: format!("{listing} returned a repeated pagination marker"),
                });
            }
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    debug!(listing, pages, count = items.len(), "Listing drained");
    Ok(items)
}
