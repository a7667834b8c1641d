//! RSS 2.0 / RSS 1.0 / Atom 1.0 parsing into [`RawItem`]s.
//!
//! Namespaced elements are matched by their conventional prefixes
//! (`content:`, `dc:`, `media:`, `itunes:`).

use super::types::RawItem;
use super::FetchError;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Rss,
    Atom,
}

/// Parse a feed document from raw XML bytes.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<RawItem>, FetchError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut format: Option<Format> = None;

    let mut current: Option<RawItem> = None;
    // element names below the current item, innermost last
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if format.is_none() {
                    format = Some(root_format(&name)?);
                }
                if name == "item" || name == "entry" {
                    current = Some(RawItem::default());
                    path.clear();
                } else if let Some(item) = current.as_mut() {
                    if format == Some(Format::Atom)
                        && path.is_empty()
                        && name == "content"
                        && attribute(&e, "type").as_deref() == Some("xhtml")
                    {
                        // inline XHTML: keep the markup, consumes through </content>
                        let markup = reader.read_text(e.name()).map_err(|err| {
                            FetchError::Parse(format!("bad xhtml content: {}", err))
                        })?;
                        item.content = markup.trim().to_string();
                    } else {
                        apply_attributes(item, &name, &e, path.last().map(String::as_str));
                        path.push(name);
                        text.clear();
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(&e);
                if format.is_none() {
                    format = Some(root_format(&name)?);
                }
                if let Some(item) = current.as_mut() {
                    apply_attributes(item, &name, &e, path.last().map(String::as_str));
                }
            }
            Ok(Event::Text(e)) => {
                if current.is_some() {
                    let chunk = e
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                    text.push_str(&chunk);
                }
            }
            Ok(Event::CData(e)) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "item" || name == "entry" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                } else if let Some(item) = current.as_mut() {
                    path.pop();
                    apply_text(
                        item,
                        format.unwrap_or(Format::Rss),
                        &name,
                        path.last().map(String::as_str),
                        text.trim(),
                    );
                    text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "XML parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if format.is_none() {
        return Err(FetchError::Parse("empty document".to_string()));
    }
    Ok(items)
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn root_format(name: &str) -> Result<Format, FetchError> {
    match name {
        "rss" | "rdf:RDF" => Ok(Format::Rss),
        "feed" => Ok(Format::Atom),
        other => Err(FetchError::Parse(format!(
            "not an RSS or Atom document (root element <{}>)",
            other
        ))),
    }
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_image_type(e: &BytesStart) -> bool {
    attribute(e, "type").is_some_and(|t| t.starts_with("image/"))
}

fn set_image(item: &mut RawItem, url: Option<String>) {
    if item.image.is_none() {
        item.image = url;
    }
}

/// Attribute-carried fields (Atom links and categories, media elements).
fn apply_attributes(item: &mut RawItem, name: &str, e: &BytesStart, parent: Option<&str>) {
    if parent.is_some() {
        return;
    }
    match name {
        "link" => {
            let rel = attribute(e, "rel").unwrap_or_else(|| "alternate".to_string());
            match rel.as_str() {
                "alternate" if item.link.is_empty() => {
                    if let Some(href) = attribute(e, "href") {
                        item.link = href;
                    }
                }
                "enclosure" if is_image_type(e) => set_image(item, attribute(e, "href")),
                _ => {}
            }
        }
        "category" => {
            if let Some(term) = attribute(e, "term") {
                item.categories.push(term);
            }
        }
        "media:thumbnail" => set_image(item, attribute(e, "url")),
        "media:content" => {
            let is_image = attribute(e, "medium").is_some_and(|m| m == "image") || is_image_type(e);
            if is_image {
                set_image(item, attribute(e, "url"));
            }
        }
        "enclosure" if is_image_type(e) => set_image(item, attribute(e, "url")),
        "itunes:image" => set_image(item, attribute(e, "href")),
        _ => {}
    }
}

/// Text-carried fields. `parent` is the enclosing element below the item.
fn apply_text(item: &mut RawItem, format: Format, name: &str, parent: Option<&str>, text: &str) {
    if text.is_empty() {
        return;
    }
    match (name, parent) {
        ("title", None) => item.title = text.to_string(),
        ("link", None) if item.link.is_empty() => item.link = text.to_string(),
        ("guid", None) | ("id", None) => item.guid = text.to_string(),
        ("category", None) => {
            // Atom categories are read from `term`; don't add them twice
            if !item.categories.iter().any(|c| c == text) {
                item.categories.push(text.to_string());
            }
        }
        ("content:encoded", None) | ("content", None) => item.content = text.to_string(),
        ("description", None) => item.description = text.to_string(),
        ("summary", None) => match format {
            Format::Atom => item.description = text.to_string(),
            Format::Rss => item.custom_summary = text.to_string(),
        },
        ("author", None) | ("dc:creator", None) | ("name", Some("author")) => {
            item.authors.push(text.to_string())
        }
        ("url", Some("image")) => set_image(item, Some(text.to_string())),
        ("pubDate", None) | ("published", None) | ("dc:date", None) => {
            if let Some(ts) = parse_date(text) {
                item.published_at = Some(ts);
            }
        }
        ("updated", None) if item.published_at.is_none() => {
            item.published_at = parse_date(text);
        }
        _ => {}
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <item>
      <title>First &amp; Foremost</title>
      <link>https://example.com/posts/1</link>
      <guid isPermaLink="false">post-1</guid>
      <category>Rust Lang</category>
      <category></category>
      <category>News</category>
      <description>&lt;p&gt;Short&lt;/p&gt;</description>
      <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
      <summary>&lt;i&gt;tl;dr&lt;/i&gt;</summary>
      <dc:creator>Alice</dc:creator>
      <media:thumbnail url="https://example.com/1.png"/>
      <pubDate>Tue, 14 Nov 2023 22:13:20 GMT</pubDate>
    </item>
    <item>
      <title>Only a guid</title>
      <guid>post-2</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://example.org/"/>
  <entry>
    <title>Atom Entry</title>
    <link rel="alternate" href="https://example.org/entry/1"/>
    <link rel="enclosure" type="image/jpeg" href="https://example.org/e.jpg"/>
    <id>urn:uuid:1225c695</id>
    <updated>2024-01-02T03:04:05Z</updated>
    <published>2024-01-01T00:00:00Z</published>
    <summary>Entry summary</summary>
    <content type="html">&lt;p&gt;Entry body&lt;/p&gt;</content>
    <category term="Tech"/>
    <author><name>Bob</name><email>bob@example.org</email></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_item() {
        let items = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "First & Foremost");
        assert_eq!(first.link, "https://example.com/posts/1");
        assert_eq!(first.guid, "post-1");
        assert_eq!(first.categories, vec!["Rust Lang", "News"]);
        assert_eq!(first.description, "<p>Short</p>");
        assert_eq!(first.content, "<p>Full <b>body</b></p>");
        assert_eq!(first.custom_summary, "<i>tl;dr</i>");
        assert_eq!(first.authors, vec!["Alice"]);
        assert_eq!(first.image.as_deref(), Some("https://example.com/1.png"));
        assert_eq!(first.published_at.map(|t| t.timestamp()), Some(1_700_000_000));

        let second = &items[1];
        assert!(second.link.is_empty());
        assert_eq!(second.identity(), Some("post-2"));
    }

    #[test]
    fn test_channel_fields_do_not_leak_into_items() {
        let items = parse_feed(RSS.as_bytes()).unwrap();
        assert_ne!(items[1].title, "Example");
        assert!(items[1].categories.is_empty());
    }

    #[test]
    fn test_parse_atom_entry() {
        let items = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);

        let entry = &items[0];
        assert_eq!(entry.title, "Atom Entry");
        assert_eq!(entry.link, "https://example.org/entry/1");
        assert_eq!(entry.guid, "urn:uuid:1225c695");
        assert_eq!(entry.description, "Entry summary");
        assert!(entry.custom_summary.is_empty());
        assert_eq!(entry.content, "<p>Entry body</p>");
        assert_eq!(entry.categories, vec!["Tech"]);
        assert_eq!(entry.authors, vec!["Bob"]);
        assert_eq!(entry.image.as_deref(), Some("https://example.org/e.jpg"));
        // `published` wins over an earlier `updated`
        assert_eq!(
            entry.published_at.map(|t| t.timestamp()),
            Some(1_704_067_200)
        );
    }

    #[test]
    fn test_atom_xhtml_content_keeps_markup() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>urn:uuid:2</id>
    <title>Inline</title>
    <content type="xhtml">
      <div xmlns="http://www.w3.org/1999/xhtml"><p>Hello <b>world</b> &amp; more</p></div>
    </content>
    <category term="Tech"/>
  </entry>
</feed>"#;
        let items = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].content,
            r#"<div xmlns="http://www.w3.org/1999/xhtml"><p>Hello <b>world</b> &amp; more</p></div>"#
        );
        // elements after the content block are still read
        assert_eq!(items[0].categories, vec!["Tech"]);
        assert_eq!(items[0].title, "Inline");
    }

    #[test]
    fn test_rejects_non_feed_documents() {
        assert!(matches!(
            parse_feed(b"<html><body>hi</body></html>"),
            Err(FetchError::Parse(_))
        ));
        assert!(parse_feed(b"").is_err());
    }

    #[test]
    fn test_empty_channel_has_no_items() {
        let xml = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;
        assert!(parse_feed(xml.as_bytes()).unwrap().is_empty());
    }
}
