//! Page-numbered pagination for admin listings.

use serde::Deserialize;

const DEFAULT_PER_PAGE: i64 = 50;
const MAX_PER_PAGE: i64 = 500;

/// A validated page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(try_from = "RawPage")]
pub struct Page {
    page: i64,
    per_page: i64,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default, rename = "perPage")]
    per_page: Option<i64>,
}

impl TryFrom<RawPage> for Page {
    type Error = String;

    fn try_from(raw: RawPage) -> Result<Self, Self::Error> {
        Page::new(raw.page.unwrap_or(1), raw.per_page.unwrap_or(DEFAULT_PER_PAGE))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Page {
    pub fn new(page: i64, per_page: i64) -> Result<Self, String> {
        if page < 1 {
            return Err(format!("page must be >= 1, got {page}"));
        }
        if per_page < 1 || per_page > MAX_PER_PAGE {
            return Err(format!(
                "perPage must be in [1, {MAX_PER_PAGE}], got {per_page}"
            ));
        }
        Ok(Self { page, per_page })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    /// Total pages for a row count; 0 rows still report one (empty) page.
    pub fn total_pages(&self, total_items: i64) -> i64 {
        if total_items == 0 {
            return 1;
        }
        (total_items + self.per_page - 1) / self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page() {
        let page = Page::default();
        assert_eq!(page.page(), 1);
        assert_eq!(page.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn offset_math() {
        let page = Page::new(3, 20).unwrap();
        assert_eq!(page.offset(), 40);
        assert_eq!(page.limit(), 20);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Page::new(0, 10).is_err());
        assert!(Page::new(1, 0).is_err());
        assert!(Page::new(1, MAX_PER_PAGE + 1).is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(1, 10).unwrap();
        assert_eq!(page.total_pages(0), 1);
        assert_eq!(page.total_pages(9), 1);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
        assert_eq!(page.total_pages(101), 11);
    }

    #[test]
    fn deserializes_from_query_names() {
        let page: Page = serde_json::from_str(r#"{"page": 2, "perPage": 25}"#).unwrap();
        assert_eq!(page.page(), 2);
        assert_eq!(page.per_page(), 25);
    }
}
