// auditlogtool/src/utils/mod.rs
use anyhow::Result;
use std::future::Future;

/// Follows continuation markers until the provider stops returning one,
/// aggregating every page.
///
/// `fetch_page` receives the marker from the previous page (`None` on the
/// first call) and returns that page's items plus the next marker, if any.
pub async fn drain_paginated<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let (mut page, next_marker) = fetch_page(marker.take()).await?;
        items.append(&mut page);

        match next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn test_aggregates_all_pages() -> anyhow::Result<()> {
        // Three pages; the last carries no continuation marker.
        let pages = RefCell::new(vec![
            (vec!["a", "b"], Some("m1".to_string())),
            (vec!["c"], Some("m2".to_string())),
            (vec!["d", "e"], None),
        ]);
        let seen_markers = RefCell::new(Vec::new());

        let items = drain_paginated(|marker| {
            seen_markers.borrow_mut().push(marker);
            let page = pages.borrow_mut().remove(0);
            async move { Ok(page) }
        })
        .await?;

        assert_eq!(items, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            *seen_markers.borrow(),
            vec![None, Some("m1".to_string()), Some("m2".to_string())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_single_empty_page() -> anyhow::Result<()> {
        let items: Vec<String> =
            drain_paginated(|_| async { Ok((Vec::new(), None)) }).await?;
        assert!(items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let result: Result<Vec<String>> = drain_paginated(|_| async {
            Err(anyhow::anyhow!("listing failed"))
        })
        .await;
        assert!(result.is_err());
    }
}
