use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use serde::Deserialize;

use super::types::{FeedFormat, ParsedEntry, ParsedFeed};

const UNTITLED_ENTRY: &str = "Untitled Entry";

#[derive(Debug, thiserror::Error)]
pub enum FeedParseError {
    #[error("feed payload is empty")]
    EmptyPayload,
    #[error("xml feed parse error: {0}")]
    Xml(#[from] feed_rs::parser::ParseFeedError),
    #[error("json feed parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct JsonFeed {
    title: Option<String>,
    #[serde(default)]
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonFeedItem {
    title: Option<String>,
    url: Option<String>,
    summary: Option<String>,
    content_text: Option<String>,
    content_html: Option<String>,
    date_published: Option<String>,
}

pub fn parse_feed_bytes(raw: &[u8]) -> Result<ParsedFeed, FeedParseError> {
    let trimmed = raw.trim_ascii_start();
    if trimmed.is_empty() {
        return Err(FeedParseError::EmptyPayload);
    }
    if trimmed[0] == b'{' {
        return parse_json_feed(trimmed);
    }
    parse_xml_feed(trimmed)
}

fn parse_xml_feed(raw: &[u8]) -> Result<ParsedFeed, FeedParseError> {
    let feed = feed_rs::parser::parse(raw)?;
    let title = feed
        .title
        .as_ref()
        .map(|text| text.content.clone())
        .unwrap_or_else(|| "Untitled Feed".to_string());
    let total = feed.entries.len();
    let entries: Vec<ParsedEntry> = feed.entries.iter().filter_map(entry_from_xml).collect();

    Ok(ParsedFeed {
        format: FeedFormat::XmlFeed,
        title,
        skipped: total - entries.len(),
        entries,
    })
}

fn parse_json_feed(raw: &[u8]) -> Result<ParsedFeed, FeedParseError> {
    let feed: JsonFeed = serde_json::from_slice(raw)?;
    let title = feed.title.unwrap_or_else(|| "Untitled Feed".to_string());
    let total = feed.items.len();
    let entries: Vec<ParsedEntry> = feed
        .items
        .into_iter()
        .filter_map(|item| {
            let link = non_blank(item.url)?;
            Some(ParsedEntry {
                title: non_blank(item.title).unwrap_or_else(|| UNTITLED_ENTRY.to_string()),
                link,
                description: item.summary.or(item.content_html).or(item.content_text),
                published_at: item
                    .date_published
                    .as_deref()
                    .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                    .map(|timestamp| timestamp.with_timezone(&Utc)),
            })
        })
        .collect();

    Ok(ParsedFeed {
        format: FeedFormat::JsonFeed,
        title,
        skipped: total - entries.len(),
        entries,
    })
}

fn entry_from_xml(entry: &Entry) -> Option<ParsedEntry> {
    let link = non_blank(entry.links.first().map(|link| link.href.clone()))?;
    let title = non_blank(entry.title.as_ref().map(|text| text.content.clone()))
        .unwrap_or_else(|| UNTITLED_ENTRY.to_string());
    let description = entry
        .summary
        .as_ref()
        .map(|text| text.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|content| content.body.clone()));

    Some(ParsedEntry {
        title,
        link,
        description,
        published_at: entry.published.or(entry.updated),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xml_fixture_feed() {
        let xml = include_bytes!("../../../fixtures/sample.rss.xml");
        let parsed = parse_feed_bytes(xml).expect("xml fixture must parse");

        assert_eq!(parsed.format, FeedFormat::XmlFeed);
        assert_eq!(parsed.title, "Lifehacker");
        assert_eq!(parsed.entries.len(), 3);
        assert_eq!(parsed.skipped, 0);

        let first = &parsed.entries[0];
        assert_eq!(first.title, "How to Clean Your Keyboard");
        assert_eq!(first.link, "https://lifehacker.com/how-to-clean-your-keyboard");
        assert_eq!(first.description.as_deref(), Some("Crumbs, dust and worse."));
        assert_eq!(
            first.published_at.map(|at| at.to_rfc3339()).as_deref(),
            Some("2024-02-18T12:30:00+00:00")
        );
        assert_eq!(parsed.entries[2].description, None);
    }

    #[test]
    fn parses_json_feed_and_skips_entries_without_link() {
        let json = include_bytes!("../../../fixtures/sample.jsonfeed.json");
        let parsed = parse_feed_bytes(json).expect("json feed must parse");

        assert_eq!(parsed.format, FeedFormat::JsonFeed);
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.entries[0].title, "First entry");
        assert_eq!(parsed.entries[1].title, UNTITLED_ENTRY);
        assert_eq!(parsed.entries[1].description.as_deref(), Some("Second body"));
        assert_eq!(parsed.entries[1].published_at, None);
    }

    #[test]
    fn rejects_empty_and_malformed_payloads() {
        assert!(matches!(
            parse_feed_bytes(b"  \n "),
            Err(FeedParseError::EmptyPayload)
        ));
        assert!(matches!(
            parse_feed_bytes(b"<html><body>not a feed</body></html>"),
            Err(FeedParseError::Xml(_))
        ));
        assert!(matches!(
            parse_feed_bytes(b"{ broken"),
            Err(FeedParseError::Json(_))
        ));
    }
}
