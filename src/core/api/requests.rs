use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::Validate;

use super::error::FieldErrors;
use crate::core::dates::{normalize_date, parse_day};
use crate::core::storage::filter::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::core::storage::{NewPost, PostChanges, PostFilter, Sort, SortField, SortOrder};

const PUB_DATE_REQUIRED: &str = "The pub date field is required.";
const PUB_DATE_INVALID: &str = "The pub date field must be a valid date.";

/// A payload member that must be text when present.
///
/// Type mismatches are kept instead of failing deserialization so they can be
/// reported next to the other field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JsonText {
    #[default]
    Absent,
    Null,
    Text(String),
    WrongType,
}

impl<'de> Deserialize<'de> for JsonText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => JsonText::Null,
            Value::String(text) => JsonText::Text(text),
            _ => JsonText::WrongType,
        })
    }
}

impl JsonText {
    /// Trimmed text, with blank and `null` treated as absent.
    fn optional(self, field: &str, errors: &mut FieldErrors) -> Option<String> {
        match self {
            JsonText::Absent | JsonText::Null => None,
            JsonText::Text(text) => non_blank(Some(text)),
            JsonText::WrongType => {
                errors.add(field, must_be_string(field));
                None
            }
        }
    }

    /// Trimmed text for a field that may be left out but never sent as `null`.
    fn sometimes(self, field: &str, errors: &mut FieldErrors) -> Option<String> {
        match self {
            JsonText::Absent => None,
            JsonText::Text(text) => Some(text.trim().to_string()),
            JsonText::Null | JsonText::WrongType => {
                errors.add(field, must_be_string(field));
                None
            }
        }
    }

    /// Outer `None` leaves the value alone, `Some(None)` clears it.
    fn nullable(self, field: &str, errors: &mut FieldErrors) -> Option<Option<String>> {
        match self {
            JsonText::Absent => None,
            JsonText::Null => Some(None),
            JsonText::Text(text) => Some(non_blank(Some(text))),
            JsonText::WrongType => {
                errors.add(field, must_be_string(field));
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: JsonText,
    #[serde(default)]
    pub link: JsonText,
    #[serde(default)]
    pub description: JsonText,
    #[serde(default)]
    pub pub_date: JsonText,
}

#[derive(Debug, Validate)]
struct CreateFields {
    #[validate(
        required(message = "The title field is required."),
        length(max = 255, message = "The title field must not be greater than 255 characters.")
    )]
    title: Option<String>,
    #[validate(
        required(message = "The link field is required."),
        url(message = "The link field must be a valid URL.")
    )]
    link: Option<String>,
}

impl CreatePostRequest {
    pub fn into_new_post(self) -> Result<NewPost, FieldErrors> {
        let mut errors = FieldErrors::default();
        let fields = CreateFields {
            title: self.title.optional("title", &mut errors),
            link: self.link.optional("link", &mut errors),
        };
        let description = self.description.optional("description", &mut errors);
        let pub_date = match self.pub_date.optional("pub_date", &mut errors) {
            None if errors.contains("pub_date") => None,
            None => {
                errors.add("pub_date", PUB_DATE_REQUIRED);
                None
            }
            Some(raw) => checked_date(&raw, &mut errors),
        };
        if let Err(validation) = fields.validate() {
            errors.absorb(FieldErrors::from(validation));
        }

        let (Some(title), Some(link), Some(pub_date), true) =
            (fields.title, fields.link, pub_date, errors.is_empty())
        else {
            return Err(errors);
        };
        Ok(NewPost {
            title,
            link,
            description,
            pub_date,
        })
    }
}

/// Absent members keep their stored value. Only `description` accepts `null`,
/// which clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub title: JsonText,
    #[serde(default)]
    pub link: JsonText,
    #[serde(default)]
    pub description: JsonText,
    #[serde(default)]
    pub pub_date: JsonText,
}

#[derive(Debug, Validate)]
struct UpdateFields {
    #[validate(length(
        min = 1,
        max = 255,
        message = "The title field must be between 1 and 255 characters."
    ))]
    title: Option<String>,
    #[validate(url(message = "The link field must be a valid URL."))]
    link: Option<String>,
}

impl UpdatePostRequest {
    pub fn into_changes(self) -> Result<PostChanges, FieldErrors> {
        let mut errors = FieldErrors::default();
        let fields = UpdateFields {
            title: self.title.sometimes("title", &mut errors),
            link: self.link.sometimes("link", &mut errors),
        };
        let description = self.description.nullable("description", &mut errors);
        let pub_date = self
            .pub_date
            .sometimes("pub_date", &mut errors)
            .and_then(|raw| checked_date(&raw, &mut errors));
        if let Err(validation) = fields.validate() {
            errors.absorb(FieldErrors::from(validation));
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(PostChanges {
            title: fields.title,
            link: fields.link,
            description,
            pub_date,
        })
    }
}

/// Raw list parameters. Everything arrives as text so that malformed values
/// are reported per field instead of rejecting the whole query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPostsQuery {
    pub title: Option<String>,
    pub pub_date: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub per_page: Option<String>,
    pub page: Option<String>,
}

impl ListPostsQuery {
    pub fn into_filter(self) -> Result<PostFilter, FieldErrors> {
        let mut errors = FieldErrors::default();

        let pub_date = non_blank(self.pub_date).and_then(|raw| {
            let day = parse_day(&raw);
            if day.is_none() {
                errors.add("pub_date", "The pub date field must match the format Y-m-d.");
            }
            day
        });

        let order = match non_blank(self.order) {
            None => SortOrder::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                errors.add("order", "The selected order is invalid. Use asc or desc.");
                SortOrder::default()
            }),
        };
        let sort = non_blank(self.sort).and_then(|raw| match raw.parse::<SortField>() {
            Ok(field) => Some(Sort { field, order }),
            Err(_) => {
                let allowed: Vec<&str> = SortField::ALL.iter().map(|field| field.column()).collect();
                errors.add(
                    "sort",
                    format!("The selected sort is invalid. Allowed: {}.", allowed.join(", ")),
                );
                None
            }
        });

        let per_page = parse_bounded(self.per_page, DEFAULT_PER_PAGE, MAX_PER_PAGE)
            .unwrap_or_else(|| {
                errors.add(
                    "per_page",
                    format!("The per page field must be an integer between 1 and {MAX_PER_PAGE}."),
                );
                DEFAULT_PER_PAGE
            });
        let page = parse_bounded(self.page, 1, u32::MAX).unwrap_or_else(|| {
            errors.add("page", "The page field must be an integer of at least 1.");
            1
        });

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(PostFilter {
            title: non_blank(self.title),
            pub_date,
            sort,
            page,
            per_page,
        })
    }
}

fn checked_date(raw: &str, errors: &mut FieldErrors) -> Option<String> {
    let normalized = normalize_date(raw);
    if normalized.is_none() {
        errors.add("pub_date", PUB_DATE_INVALID);
    }
    normalized
}

/// `None` for an invalid value, `default` when absent.
fn parse_bounded(raw: Option<String>, default: u32, max: u32) -> Option<u32> {
    match non_blank(raw) {
        None => Some(default),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|value| (1..=max).contains(value)),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    trimmed(value).filter(|value| !value.is_empty())
}

fn must_be_string(field: &str) -> String {
    format!("The {} field must be a string.", field.replace('_', " "))
}
