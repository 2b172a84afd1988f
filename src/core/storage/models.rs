use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PostRecord {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub pub_date: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Validated fields of a post that does not exist yet. `pub_date` is already
/// in storage format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub pub_date: String,
}

/// Partial update. `None` leaves a column untouched; `description: Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<Option<String>>,
    pub pub_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, current_page: u32, per_page: u32, total: u64) -> Self {
        let per_page_wide = u64::from(per_page.max(1));
        let last_page = total.div_ceil(per_page_wide).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = u64::from(current_page.saturating_sub(1)) * per_page_wide + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };
        Self {
            data,
            current_page,
            per_page,
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            from,
            to,
        }
    }
}
