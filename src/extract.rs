//! Per-item record extraction from rendered list-item markup.

use crate::record::Record;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::fmt;

/// Pattern applied to an item's DOM identifier; the second numeric component
/// (capture 1) is the message id.
pub const DEFAULT_ID_PATTERN: &str = r"^chat-messages-\d+-(\d+)$";

/// Class stems and patterns binding the extractor to the host list's
/// rendering contract. Owned immutably by each extractor instance.
#[derive(Debug, Clone)]
pub struct ExtractRules {
    /// Pattern for the item root's `id` attribute; capture 1 is the message id.
    pub id_pattern: Regex,
    /// Class stem marking structural/system notices, which are skipped.
    pub notice_class: String,
    /// Class stem of the sender display-name element.
    pub username_class: String,
    /// Class stem of the message content container.
    pub content_class: String,
    /// Class stem of the replied-to quoted region, excluded wholesale.
    pub reply_class: String,
    /// Class stem of inline emoji segments.
    pub emoji_class: String,
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self {
            id_pattern: Regex::new(DEFAULT_ID_PATTERN).expect("default id pattern"),
            notice_class: "system-message".to_string(),
            username_class: "username".to_string(),
            content_class: "message-content".to_string(),
            reply_class: "reply-context".to_string(),
            emoji_class: "emoji".to_string(),
        }
    }
}

/// Errors surfaced while extracting a record from one item.
#[derive(Debug)]
pub enum ExtractError {
    /// The item markup contained no root element.
    EmptyItem,
    /// The item's DOM identifier did not match the expected pattern.
    IdPattern {
        /// The identifier value that failed to match.
        dom_id: String,
    },
    /// A non-notice item carried no message content container.
    MissingContent {
        /// Message id of the offending item.
        id: u64,
    },
    /// The machine-readable datetime attribute failed to parse.
    Timestamp {
        /// Message id of the offending item.
        id: u64,
        /// The attribute value that failed to parse.
        value: String,
    },
    /// A selector built from the extraction rules failed to compile.
    Rules(String),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyItem => write!(f, "item markup has no root element"),
            Self::IdPattern { dom_id } => {
                write!(f, "item id {dom_id:?} does not encode a message id")
            }
            Self::MissingContent { id } => {
                write!(f, "message {id} has no content container")
            }
            Self::Timestamp { id, value } => {
                write!(f, "message {id} has unparseable datetime {value:?}")
            }
            Self::Rules(detail) => write!(f, "invalid extraction rules: {detail}"),
        }
    }
}

impl Error for ExtractError {}

/// Pure, synchronous extractor turning one item's rendered markup into a
/// [`Record`], or signalling that the item contributes nothing.
pub struct RecordExtractor {
    rules: ExtractRules,
    username: Selector,
    content: Selector,
    time: Selector,
    emoji_name: Selector,
}

impl RecordExtractor {
    /// Compiles the given rules into an extractor. Fails fast when a class
    /// stem cannot form a valid selector.
    pub fn new(rules: ExtractRules) -> Result<Self, ExtractError> {
        let username = class_selector(&rules.username_class)?;
        let content = class_selector(&rules.content_class)?;
        let time = Selector::parse("time[datetime]").expect("time selector");
        let emoji_name = Selector::parse("img[data-name]").expect("emoji name selector");
        Ok(Self {
            rules,
            username,
            content,
            time,
            emoji_name,
        })
    }

    /// Returns the rules this extractor was built from.
    pub fn rules(&self) -> &ExtractRules {
        &self.rules
    }

    /// Extracts a record from one item's markup.
    ///
    /// `Ok(None)` is the deliberate skip for structural/system notices. A
    /// missing author is a valid value (grouped continuation message), not
    /// an error. Everything else that deviates from the rendering contract
    /// is fatal to the harvesting run.
    pub fn extract(&self, item_html: &str) -> Result<Option<Record>, ExtractError> {
        let fragment = Html::parse_fragment(item_html);
        let root = fragment
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .next()
            .ok_or(ExtractError::EmptyItem)?;

        let root_class = root.value().attr("class").unwrap_or_default();
        if root_class.contains(self.rules.notice_class.as_str()) {
            return Ok(None);
        }

        let dom_id = root.value().attr("id").unwrap_or_default();
        let id = self.parse_message_id(dom_id)?;

        let author = root
            .select(&self.username)
            .find(|el| !self.inside_reply(el))
            .map(|el| el.text().collect::<String>().trim().to_string());

        let content = root
            .select(&self.content)
            .find(|el| !self.inside_reply(el))
            .ok_or(ExtractError::MissingContent { id })?;
        let text = self.collect_text(content);

        let timestamp = match root.select(&self.time).find(|el| !self.inside_reply(el)) {
            Some(el) => {
                let value = el.value().attr("datetime").unwrap_or_default();
                Some(parse_epoch_ms(value).ok_or_else(|| ExtractError::Timestamp {
                    id,
                    value: value.to_string(),
                })?)
            }
            None => None,
        };

        Ok(Some(Record {
            id,
            author,
            text,
            timestamp,
        }))
    }

    fn parse_message_id(&self, dom_id: &str) -> Result<u64, ExtractError> {
        let fail = || ExtractError::IdPattern {
            dom_id: dom_id.to_string(),
        };
        let captures = self.rules.id_pattern.captures(dom_id).ok_or_else(fail)?;
        let digits = captures.get(1).ok_or_else(fail)?;
        digits.as_str().parse::<u64>().map_err(|_| fail())
    }

    fn inside_reply(&self, el: &ElementRef<'_>) -> bool {
        el.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
            ancestor
                .value()
                .attr("class")
                .unwrap_or_default()
                .contains(self.rules.reply_class.as_str())
        })
    }

    /// Concatenates the content container's inline segments in document
    /// order with no delimiter, skipping quoted reply regions wholesale.
    fn collect_text(&self, content: ElementRef<'_>) -> String {
        let mut text = String::new();
        for node in content.children() {
            if let Some(fragment) = node.value().as_text() {
                text.push_str(fragment);
            } else if let Some(el) = ElementRef::wrap(node) {
                self.push_segment(&mut text, el);
            }
        }
        text
    }

    fn push_segment(&self, text: &mut String, el: ElementRef<'_>) {
        let class = el.value().attr("class").unwrap_or_default();
        if class.contains(self.rules.reply_class.as_str()) {
            return;
        }
        for piece in el.text() {
            text.push_str(piece);
        }
        if class.contains(self.rules.emoji_class.as_str()) {
            // The glyph itself cannot survive as plain text, so the token's
            // canonical name makes the segment self-describing.
            if let Some(name) = el
                .select(&self.emoji_name)
                .next()
                .and_then(|img| img.value().attr("data-name"))
            {
                text.push(':');
                text.push_str(name);
                text.push(':');
            }
        }
    }
}

fn class_selector(stem: &str) -> Result<Selector, ExtractError> {
    Selector::parse(&format!("[class*=\"{stem}\"]"))
        .map_err(|err| ExtractError::Rules(err.to_string()))
}

fn parse_epoch_ms(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(ExtractRules::default()).expect("default rules compile")
    }

    #[test]
    fn extracts_a_full_message() {
        let html = concat!(
            r#"<li id="chat-messages-100200-300400" class="messageListItem">"#,
            r#"<span class="username-a1b2">Ana</span>"#,
            r#"<time datetime="2024-05-01T10:00:00.000Z">today</time>"#,
            r#"<div class="message-content-c3d4"><span>hello there</span></div>"#,
            r#"</li>"#,
        );

        let record = extractor()
            .extract(html)
            .expect("extraction succeeds")
            .expect("item yields a record");
        assert_eq!(record.id, 300400);
        assert_eq!(record.author.as_deref(), Some("Ana"));
        assert_eq!(record.text, "hello there");
        assert_eq!(record.timestamp, Some(1_714_557_600_000));
    }

    #[test]
    fn grouped_message_has_no_author_and_no_timestamp_error() {
        let html = concat!(
            r#"<li id="chat-messages-1-2">"#,
            r#"<div class="message-content"><span>continuation</span></div>"#,
            r#"</li>"#,
        );

        let record = extractor().extract(html).expect("ok").expect("record");
        assert_eq!(record.id, 2);
        assert_eq!(record.author, None);
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn system_notice_is_skipped_without_error() {
        let html = r#"<li id="whatever" class="system-message divider">pins changed</li>"#;
        assert!(extractor().extract(html).expect("ok").is_none());
    }

    #[test]
    fn malformed_identifier_is_a_fatal_parse_error() {
        let html = concat!(
            r#"<li id="sidebar-item-17">"#,
            r#"<div class="message-content"><span>x</span></div>"#,
            r#"</li>"#,
        );

        match extractor().extract(html) {
            Err(ExtractError::IdPattern { dom_id }) => assert_eq!(dom_id, "sidebar-item-17"),
            other => panic!("expected id pattern error, got {other:?}"),
        }
    }

    #[test]
    fn missing_content_container_is_fatal() {
        let html = r#"<li id="chat-messages-1-9"><span class="username">Bo</span></li>"#;
        match extractor().extract(html) {
            Err(ExtractError::MissingContent { id }) => assert_eq!(id, 9),
            other => panic!("expected missing content error, got {other:?}"),
        }
    }

    #[test]
    fn quoted_reply_region_is_excluded_wholesale() {
        let html = concat!(
            r#"<li id="chat-messages-5-6">"#,
            r#"<div class="reply-context-e5f6">"#,
            r#"<span class="username">Quoted</span>"#,
            r#"<div class="message-content"><span>old words</span></div>"#,
            r#"</div>"#,
            r#"<span class="username">Replier</span>"#,
            r#"<div class="message-content"><span>new words</span></div>"#,
            r#"</li>"#,
        );

        let record = extractor().extract(html).expect("ok").expect("record");
        assert_eq!(record.author.as_deref(), Some("Replier"));
        assert_eq!(record.text, "new words");
    }

    #[test]
    fn emoji_segments_append_their_canonical_name() {
        let html = concat!(
            r#"<li id="chat-messages-7-8">"#,
            r#"<div class="message-content">"#,
            r#"<span>nice </span>"#,
            r#"<span class="emoji-g7h8"><img data-name="fire" alt=""></span>"#,
            r#"<span>!</span>"#,
            r#"</div>"#,
            r#"</li>"#,
        );

        let record = extractor().extract(html).expect("ok").expect("record");
        assert_eq!(record.text, "nice :fire:!");
    }

    #[test]
    fn unparseable_datetime_attribute_is_fatal() {
        let html = concat!(
            r#"<li id="chat-messages-1-3">"#,
            r#"<time datetime="yesterday-ish">x</time>"#,
            r#"<div class="message-content"><span>x</span></div>"#,
            r#"</li>"#,
        );

        match extractor().extract(html) {
            Err(ExtractError::Timestamp { id, value }) => {
                assert_eq!(id, 3);
                assert_eq!(value, "yesterday-ish");
            }
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn reextracting_unchanged_markup_yields_identical_fields() {
        let html = concat!(
            r#"<li id="chat-messages-2-4">"#,
            r#"<span class="username">Ana</span>"#,
            r#"<div class="message-content"><span>stable</span></div>"#,
            r#"</li>"#,
        );

        let ex = extractor();
        let first = ex.extract(html).expect("ok").expect("record");
        let second = ex.extract(html).expect("ok").expect("record");
        assert_eq!(first, second);
    }
}
