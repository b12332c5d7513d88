//! `$skip`/`$top` page walker

use serde::de::DeserializeOwned;
use tracing::debug;

use super::http_client::HttpExecutor;
use crate::config::PaginationConfig;
use crate::error::ApiError;

/// Collects every item of a paginated listing
#[derive(Debug, Clone)]
pub struct Paginator {
    executor: HttpExecutor,
    page_size: u32,
    max_pages: u32,
}

impl Paginator {
    /// Create a paginator over the given executor
    ///
    /// # Arguments
    ///
    /// * `executor` - Authenticated request executor
    /// * `config` - Page size and page limit; zero values are raised to one
    pub fn new(executor: HttpExecutor, config: &PaginationConfig) -> Self {
        Self {
            executor,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    /// Underlying executor
    pub fn executor(&self) -> &HttpExecutor {
        &self.executor
    }

    /// Fetch all pages of `path`
    ///
    /// Each page is either a bare JSON array or an object holding the array
    /// under `items_key`. Walking stops at the first short or empty page.
    ///
    /// # Arguments
    ///
    /// * `path` - Listing path relative to the API base URL
    /// * `params` - Query parameters sent with every page
    /// * `items_key` - Key holding the items when pages are objects
    ///
    /// # Returns
    ///
    /// Every item in listing order, or `ApiError::InvalidResponse` when a page
    /// has the wrong shape or `max_pages` is reached without a short page
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        items_key: Option<&str>,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut skip: u64 = 0;

        for page in 0..self.max_pages {
            let mut page_params = params.to_vec();
            page_params.push(("$skip".to_string(), skip.to_string()));
            page_params.push(("$top".to_string(), self.page_size.to_string()));

            let body: serde_json::Value = self.executor.get_json(path, &page_params).await?;
            let page_items: Vec<T> = extract_items(body, items_key)
                .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))?;

            let count = page_items.len();
            debug!(path = path, page = page, count = count, "Fetched page");
            items.extend(page_items);

            if count < self.page_size as usize {
                return Ok(items);
            }
            skip += count as u64;
        }

        Err(ApiError::InvalidResponse(format!(
            "{}: exceeded {} pages, server may be ignoring $skip",
            path, self.max_pages
        )))
    }
}

/// Pull the item array out of a page body
///
/// # Arguments
///
/// * `body` - Decoded page body
/// * `items_key` - Key holding the items when the body is an object
///
/// # Returns
///
/// The decoded items, or a description of why the body has no usable array
pub fn extract_items<T: DeserializeOwned>(
    body: serde_json::Value,
    items_key: Option<&str>,
) -> Result<Vec<T>, String> {
    let array = match (body, items_key) {
        (serde_json::Value::Array(items), _) => serde_json::Value::Array(items),
        (serde_json::Value::Object(mut map), Some(key)) => map
            .remove(key)
            .ok_or_else(|| format!("missing '{}' in response", key))?,
        (serde_json::Value::Object(_), None) => {
            return Err("expected an array response".to_string())
        }
        (other, _) => return Err(format!("unexpected response shape: {}", type_name(&other))),
    };

    serde_json::from_value(array).map_err(|e| e.to_string())
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
