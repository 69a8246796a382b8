//! Continuation-token paging

use errors::{PortalError, PortalResult};
use portal_model::{DeviceTwin, TwinPage};
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;

/// Registry page size used by the sync jobs
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Fetch pages until the registry stops returning a continuation token
///
/// Any page failure aborts the whole listing, so callers never act on a
/// partial view of the registry.
pub async fn collect_all_pages<F, Fut>(page_size: usize, mut fetch: F) -> PortalResult<Vec<DeviceTwin>>
where
    F: FnMut(Option<String>, usize) -> Fut,
    Fut: Future<Output = PortalResult<TwinPage>>,
{
    let mut items = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(continuation.clone(), page_size).await?;
        pages += 1;
        let is_last = page.is_last();
        items.extend(page.items);

        if is_last {
            break;
        }

        let token = page.continuation_token.unwrap_or_default();
        if !seen_tokens.insert(token.clone()) {
            return Err(PortalError::registry(
                "paging",
                format!("continuation token repeated after {} pages", pages),
            ));
        }
        continuation = Some(token);
    }

    debug!("Collected {} twins in {} pages", items.len(), pages);
    Ok(items)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(ids: &[&str], next: Option<&str>) -> TwinPage {
        TwinPage {
            items: ids.iter().map(|id| DeviceTwin::new(*id, 1)).collect(),
            total_items: None,
            continuation_token: next.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_collects_every_page() {
        let calls = AtomicUsize::new(0);
        let twins = collect_all_pages(2, |token, size| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(size, 2);
            async move {
                Ok(match token.as_deref() {
                    None => page(&["a", "b"], Some("t1")),
                    Some("t1") => page(&["c", "d"], Some("t2")),
                    _ => page(&["e"], None),
                })
            }
        })
        .await
        .unwrap();

        let ids: Vec<_> = twins.iter().map(|t| t.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_page_failure_propagates() {
        let result = collect_all_pages(2, |token, _| async move {
            match token {
                None => Ok(page(&["a"], Some("t1"))),
                Some(_) => Err(PortalError::InternalServerError("registry down".into())),
            }
        })
        .await;

        assert!(matches!(result, Err(PortalError::InternalServerError(_))));
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let result = collect_all_pages(1, |_, _| async { Ok(page(&["a"], Some("same"))) }).await;
        assert!(matches!(result, Err(PortalError::Registry { .. })));
    }
}
