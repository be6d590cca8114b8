//! RSS 2.0 / Atom feed source over HTTP.
//!
//! Entries are read from `<item>` (RSS) or `<entry>` (Atom) elements. The
//! entry identifier is the link, falling back to guid/id and finally the
//! title; entries with none of these are dropped. Snippets have markup
//! stripped and whitespace collapsed.

use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::debug;

use super::{FeedSource, FetchError};
use crate::config::defaults::SNIPPET_MAX_CHARS;
use crate::types::FeedEntry;

/// Fetches and parses feeds with a shared `reqwest` client.
pub struct RssFeedSource {
    http: reqwest::Client,
    timeout: Duration,
}

impl RssFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("surge-roster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let entries = parse_feed(&body)?;
        debug!(url, entries = entries.len(), "Feed fetched");
        Ok(entries)
    }

    fn source_name(&self) -> &str {
        "rss"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    Summary,
    Content,
    Published,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"guid" | b"id" => Some(Field::Guid),
        b"description" | b"summary" => Some(Field::Summary),
        b"content" | b"encoded" => Some(Field::Content),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
        _ => None,
    }
}

fn is_entry(local_name: &[u8]) -> bool {
    local_name == b"item" || local_name == b"entry"
}

/// Text collected for one `<item>` / `<entry>`.
#[derive(Debug, Default)]
struct EntryFields {
    title: String,
    link: String,
    guid: String,
    summary: String,
    content: String,
    published: String,
}

impl EntryFields {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Guid => &mut self.guid,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            Field::Published => &mut self.published,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }

    /// Atom links carry the URL in `href`; only `rel="alternate"` (or no rel) counts.
    fn take_link_href(&mut self, element: &BytesStart<'_>) {
        if !self.link.is_empty() {
            return;
        }
        let rel = attribute(element, b"rel");
        if rel.as_deref().map_or(true, |r| r == "alternate") {
            if let Some(href) = attribute(element, b"href") {
                self.link = href;
            }
        }
    }

    fn into_entry(self) -> Option<FeedEntry> {
        let identifier = [&self.link, &self.guid, &self.title]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())?
            .to_string();

        let body = if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        };
        let published = self.published.trim();

        Some(FeedEntry {
            identifier,
            title: collapse_whitespace(&self.title),
            snippet: truncate_chars(&strip_markup(body), SNIPPET_MAX_CHARS),
            published: (!published.is_empty()).then(|| published.to_string()),
        })
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(Cow::into_owned))
}

/// Parse an RSS 2.0 or Atom document into entries, in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryFields> = None;
    // Open elements below the current item; 1 = direct child.
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    let mut saw_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_element = true;
                let local = e.local_name();
                if let Some(fields) = current.as_mut() {
                    depth += 1;
                    if depth == 1 {
                        field = field_for(local.as_ref());
                        if field == Some(Field::Link) {
                            fields.take_link_href(&e);
                        }
                    }
                } else if is_entry(local.as_ref()) {
                    current = Some(EntryFields::default());
                    depth = 0;
                    field = None;
                }
            }
            Ok(Event::Empty(e)) => {
                saw_element = true;
                if let Some(fields) = current.as_mut() {
                    if depth == 0 && e.local_name().as_ref() == b"link" {
                        fields.take_link_href(&e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(fields), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    fields.push(f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(fields), Some(f)) = (current.as_mut(), field) {
                    fields.push(f, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                if current.is_some() {
                    if depth == 0 {
                        match current.take().and_then(EntryFields::into_entry) {
                            Some(entry) => entries.push(entry),
                            None => debug!("Dropping feed entry without link, guid or title"),
                        }
                    } else {
                        depth -= 1;
                        if depth == 0 {
                            field = None;
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(FetchError::Xml(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    if !saw_element {
        return Err(FetchError::Parse("document contains no XML elements".into()));
    }
    Ok(entries)
}

#[allow(clippy::expect_used)]
fn markup_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"))
}

/// Remove HTML tags and common leftover entities, then collapse whitespace.
fn strip_markup(html: &str) -> String {
    let text = markup_pattern().replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>World News</title>
    <link>https://news.test/</link>
    <atom:link href="https://news.test/rss" rel="self" type="application/rss+xml"/>
    <item>
      <title>Flooding   closes ports</title>
      <link>https://news.test/a/1</link>
      <guid isPermaLink="false">a-1</guid>
      <description><![CDATA[<p>Heavy rain <b>shut</b> three ports.</p>]]></description>
      <pubDate>Mon, 06 May 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Markets &amp; rates</title>
      <guid>a-2</guid>
      <description>Central bank &lt;em&gt;holds&lt;/em&gt; rates</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <link href="https://news.test/"/>
  <entry>
    <title>Summit ends without deal</title>
    <link rel="edit" href="https://news.test/edit/9"/>
    <link rel="alternate" href="https://news.test/b/9"/>
    <id>urn:uuid:1225c695</id>
    <updated>2024-05-06T18:30:02Z</updated>
    <summary>Leaders left Geneva on Monday.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parses_rss_items() {
        let entries = parse_feed(RSS).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].identifier, "https://news.test/a/1");
        assert_eq!(entries[0].title, "Flooding closes ports");
        assert_eq!(entries[0].snippet, "Heavy rain shut three ports.");
        assert_eq!(entries[0].published.as_deref(), Some("Mon, 06 May 2024 10:00:00 GMT"));

        // No link: guid is the identifier.
        assert_eq!(entries[1].identifier, "a-2");
        assert_eq!(entries[1].title, "Markets & rates");
        assert_eq!(entries[1].snippet, "Central bank holds rates");
        assert_eq!(entries[1].published, None);
    }

    #[test]
    fn test_parses_atom_entries() {
        let entries = parse_feed(ATOM).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identifier, "https://news.test/b/9");
        assert_eq!(entries[0].snippet, "Leaders left Geneva on Monday.");
        assert_eq!(entries[0].published.as_deref(), Some("2024-05-06T18:30:02Z"));
    }

    #[test]
    fn test_entry_without_identity_is_dropped() {
        let xml = "<rss><channel><item><description>orphan</description></item></channel></rss>";
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_title_is_last_resort_identifier() {
        let xml = "<rss><channel><item><title>Only a title</title></item></channel></rss>";
        assert_eq!(parse_feed(xml).unwrap()[0].identifier, "Only a title");
    }

    #[test]
    fn test_mismatched_tags_are_xml_error() {
        let xml = "<rss><channel><item><title>x</item></channel></rss>";
        assert!(matches!(parse_feed(xml), Err(FetchError::Xml(_))));
    }

    #[test]
    fn test_non_xml_body_is_parse_error() {
        assert!(matches!(parse_feed("service unavailable"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_long_snippet_truncated() {
        let body = "word ".repeat(400);
        let xml = format!("<rss><channel><item><link>https://x.test/1</link><description>{body}</description></item></channel></rss>");
        let entries = parse_feed(&xml).unwrap();
        assert_eq!(entries[0].snippet.chars().count(), SNIPPET_MAX_CHARS + 1);
        assert!(entries[0].snippet.ends_with('…'));
    }
}
