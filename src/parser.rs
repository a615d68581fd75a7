// src/parser.rs
//! Format-cascade feed parser: RSS 2.0, then Atom, then RSS 1.0/RDF.
//!
//! Each branch is a pure function over the document text; the first branch
//! that extracts any entries wins and later branches are never attempted.
//! Validity filtering (non-empty title and link) happens after the cascade,
//! so a document full of shaped-but-invalid entries still claims its branch.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

/// Canonical item shape used throughout the pipeline after parsing.
/// `published_at` stays source-native text and is never parsed to a
/// timestamp type.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published_at: String,
    pub source: String,
}

impl FeedItem {
    /// An item is publishable only with a non-empty title and link.
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.link.is_empty()
    }
}

/// Parse raw feed bytes into valid canonical items.
///
/// Malformed encoding never raises (lossy decode); only a document without
/// a readable XML root yields [`ParseError`]. Recoverable mid-document
/// errors are absorbed, keeping the entries gathered so far. The feed URL
/// is stamped onto every item after the cascade completes.
pub fn parse_feed(raw: &[u8], source_url: &str) -> Result<Vec<FeedItem>, ParseError> {
    let xml = String::from_utf8_lossy(raw);
    if !has_root(&xml) {
        return Err(ParseError("no parseable XML root element".to_string()));
    }

    let mut extracted = rss2_items(&xml);
    if extracted.is_empty() {
        extracted = atom_items(&xml);
    }
    if extracted.is_empty() {
        extracted = rss1_items(&xml);
    }

    let mut valid = Vec::with_capacity(extracted.len());
    for mut item in extracted {
        item.title = normalize_text(&item.title);
        item.link = normalize_text(&item.link);
        item.summary = normalize_text(&item.summary);
        item.published_at = item.published_at.trim().to_string();
        item.source = source_url.to_string();
        if item.is_valid() {
            valid.push(item);
        }
    }
    tracing::debug!(count = valid.len(), source = source_url, "parsed valid items");
    Ok(valid)
}

/// RSS 2.0: `channel/item` with `title`, `link`, `description` (falling
/// back to `summary`, then `content`) and `pubDate`.
pub fn rss2_items(xml: &str) -> Vec<FeedItem> {
    collect_entries(xml, "item", true)
        .into_iter()
        .map(|e| FeedItem {
            title: e.text("title"),
            link: e.text("link"),
            summary: e.first_of(&["description", "summary", "content"]),
            published_at: e.text("pubDate"),
            source: String::new(),
        })
        .collect()
}

/// Atom: top-level `entry` elements; link from the first href-bearing
/// `link` child, falling back to `id`; content preferred over summary;
/// `published` preferred over `updated`.
pub fn atom_items(xml: &str) -> Vec<FeedItem> {
    collect_entries(xml, "entry", false)
        .into_iter()
        .map(|e| {
            let link = e.link_href.clone().unwrap_or_else(|| e.text("id"));
            FeedItem {
                title: e.text("title"),
                link,
                summary: e.first_of(&["content", "summary"]),
                published_at: e.first_of(&["published", "updated"]),
                source: String::new(),
            }
        })
        .collect()
}

/// RSS 1.0/RDF: bare `item` elements; no reliable publish date.
pub fn rss1_items(xml: &str) -> Vec<FeedItem> {
    collect_entries(xml, "item", false)
        .into_iter()
        .map(|e| FeedItem {
            title: e.text("title"),
            link: e.text("link"),
            summary: e.text("description"),
            published_at: String::new(),
            source: String::new(),
        })
        .collect()
}

/// Strip embedded markup, decode HTML entities, trim surrounding space.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(s, "");
    html_escape::decode_html_entities(stripped.as_ref())
        .trim()
        .to_string()
}

/// One extracted entry before field preference is applied: the first text
/// value per direct-child local name, plus the first `href` seen on a
/// `link` child.
#[derive(Debug, Default)]
struct RawEntry {
    fields: HashMap<String, String>,
    link_href: Option<String>,
}

impl RawEntry {
    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn first_of(&self, names: &[&str]) -> String {
        names
            .iter()
            .filter_map(|n| self.fields.get(*n))
            .find(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// Walk the document collecting elements named `entry_name` (namespaces
/// ignored), optionally requiring a direct `channel` parent. A reader
/// error ends the walk with whatever was gathered; the entry being built
/// at that point is dropped, not the whole document.
fn collect_entries(xml: &str, entry_name: &str, require_channel_parent: bool) -> Vec<RawEntry> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<RawEntry> = None;
    // path.len() while the entry element is open
    let mut entry_depth = 0usize;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if current.is_none()
                    && name == entry_name
                    && (!require_channel_parent || path.last().is_some_and(|p| p == "channel"))
                {
                    current = Some(RawEntry::default());
                    entry_depth = path.len() + 1;
                } else if let Some(entry) = current.as_mut() {
                    if path.len() == entry_depth && field.is_none() {
                        if name == "link" && entry.link_href.is_none() {
                            entry.link_href = attr_value(&e, "href");
                        }
                        field = Some((name.clone(), String::new()));
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if let Some(entry) = current.as_mut() {
                    if path.len() == entry_depth && field.is_none() {
                        if name == "link" && entry.link_href.is_none() {
                            entry.link_href = attr_value(&e, "href");
                        }
                        entry.fields.entry(name).or_default();
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, buf)) = field.as_mut() {
                    match t.unescape() {
                        Ok(s) => buf.push_str(&s),
                        Err(_) => buf.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let Some((_, buf)) = field.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
                if path.len() == entry_depth {
                    // a direct child of the entry just closed
                    if let (Some(entry), Some((name, text))) = (current.as_mut(), field.take()) {
                        entry.fields.entry(name).or_insert(text);
                    }
                } else if path.len() + 1 == entry_depth {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                        field = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            Ok(_) => {}
        }
    }

    entries
}

fn attr_value(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            let value = value.trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// True when the document yields at least one element before erroring out.
fn has_root(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => return true,
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tags_then_decodes_entities() {
        assert_eq!(normalize_text("  <b>Bold</b> move  "), "Bold move");
        assert_eq!(
            normalize_text("Tom &amp; Jerry &lt;3 &quot;cheese&quot; &#39;ok&#39;"),
            r#"Tom & Jerry <3 "cheese" 'ok'"#
        );
        assert_eq!(normalize_text("<p>a<br/>b</p>"), "ab");
    }

    #[test]
    fn has_root_rejects_plain_text_and_empty_input() {
        assert!(!has_root(""));
        assert!(!has_root("just some prose, no markup"));
        assert!(has_root("<rss><channel></channel></rss>"));
    }

    #[test]
    fn cdata_and_nested_markup_are_collected() {
        let xml = r#"<rss><channel><item>
            <title><![CDATA[Hello <em>there</em>]]></title>
            <link>https://example.com/a</link>
        </item></channel></rss>"#;
        let items = parse_feed(xml.as_bytes(), "src").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hello there");
    }

    #[test]
    fn first_field_occurrence_wins() {
        let xml = r#"<rss><channel><item>
            <title>one</title>
            <title>two</title>
            <link>https://example.com</link>
        </item></channel></rss>"#;
        let items = parse_feed(xml.as_bytes(), "src").unwrap();
        assert_eq!(items[0].title, "one");
    }
}
