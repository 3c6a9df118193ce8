use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::custom_date::normalize_pub_date;
use crate::xml::{XmlNode, CONTENT_NS, MEDIA_NS};

pub const UNTITLED: &str = "Untitled Recipe";
pub const DESCRIPTION_LIMIT: usize = 160;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"(?s)<.*?>").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeCard {
    pub title: String,
    pub image: String,
    pub description: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
}

/// What happens to an item for which no image source could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ImagePolicy {
    #[default]
    Drop,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub image_policy: ImagePolicy,
    pub placeholder_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContent {
    pub url: String,
    pub width: Option<String>,
}

/// Typed view of one `<item>`. Nothing downstream of this struct sees the XML tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub thumbnail: Option<String>,
    pub media_contents: Vec<MediaContent>,
    pub enclosure: Option<String>,
}

impl RawItem {
    pub fn from_node(item: &XmlNode) -> Self {
        let owned = |s: Option<&str>| s.map(str::to_string);

        // direct children first, then anything wrapped in <media:group>
        let media_scopes: Vec<&XmlNode> = std::iter::once(item)
            .chain(item.children_named(Some(MEDIA_NS), "group"))
            .collect();

        let thumbnail = media_scopes
            .iter()
            .copied()
            .flat_map(|scope| scope.children_named(Some(MEDIA_NS), "thumbnail"))
            .find_map(|thumb| non_blank_attr(thumb, "url"));

        let media_contents = media_scopes
            .iter()
            .copied()
            .flat_map(|scope| scope.children_named(Some(MEDIA_NS), "content"))
            .filter_map(|content| {
                non_blank_attr(content, "url").map(|url| MediaContent {
                    url,
                    width: content.attr("width").map(str::to_string),
                })
            })
            .collect();

        let enclosure = item
            .child(None, "enclosure")
            .and_then(|enc| non_blank_attr(enc, "url"));

        let description = item
            .child_text(None, "description")
            .or_else(|| item.child_text(Some(CONTENT_NS), "encoded"));

        RawItem {
            title: owned(item.child_text(None, "title")),
            link: owned(item.child_text(None, "link")),
            description: owned(description),
            pub_date: owned(item.child_text(None, "pubDate")),
            thumbnail,
            media_contents,
            enclosure,
        }
    }

    /// Picks the display image: thumbnail, then the 1280 rendition of media
    /// content (or its first entry), then the enclosure.
    pub fn resolve_image(&self) -> Option<String> {
        if let Some(thumb) = &self.thumbnail {
            return Some(thumb.clone());
        }

        let preferred = self
            .media_contents
            .iter()
            .find(|c| c.width.as_deref() == Some("1280") || c.url.contains("1280"))
            .or_else(|| self.media_contents.first());
        if let Some(content) = preferred {
            return Some(content.url.clone());
        }

        self.enclosure.clone()
    }
}

fn non_blank_attr(node: &XmlNode, name: &str) -> Option<String> {
    node.attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Strips HTML tags and caps the result at [`DESCRIPTION_LIMIT`] characters plus `...`.
pub fn sanitize_description(raw: &str) -> String {
    let text = HTML_TAG.replace_all(raw, "");

    if text.chars().count() > DESCRIPTION_LIMIT {
        let mut truncated: String = text.chars().take(DESCRIPTION_LIMIT).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.into_owned()
    }
}

/// Maps one raw item to a card, or `None` when the item is filtered out.
pub fn normalize_item(
    raw: &RawItem,
    options: &NormalizeOptions,
    now: DateTime<Utc>,
) -> Option<RecipeCard> {
    let image = match (raw.resolve_image(), options.image_policy) {
        (Some(image), _) => image,
        (None, ImagePolicy::Placeholder) => options.placeholder_image.clone(),
        (None, ImagePolicy::Drop) => return None,
    };

    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    if title.is_empty() || image.is_empty() {
        return None;
    }

    Some(RecipeCard {
        title,
        image,
        description: raw
            .description
            .as_deref()
            .map(sanitize_description)
            .unwrap_or_default(),
        link: raw
            .link
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or("#")
            .to_string(),
        pub_date: normalize_pub_date(raw.pub_date.as_deref(), now),
    })
}

/// Normalizes every item in feed order, skipping the ones [`normalize_item`] rejects.
pub fn normalize_items(
    items: &[XmlNode],
    options: &NormalizeOptions,
    now: DateTime<Utc>,
) -> Vec<RecipeCard> {
    items
        .iter()
        .map(RawItem::from_node)
        .filter_map(|raw| normalize_item(&raw, options, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_items;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn drop_policy() -> NormalizeOptions {
        NormalizeOptions {
            image_policy: ImagePolicy::Drop,
            placeholder_image: "/images/recipe-placeholder.jpg".into(),
        }
    }

    fn item(body: &str) -> RawItem {
        let xml = format!(
            r#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"
                    xmlns:content="http://purl.org/rss/1.0/modules/content/">
                 <channel><item>{body}</item></channel></rss>"#
        );
        RawItem::from_node(&parse_items(&xml).unwrap()[0])
    }

    #[test]
    fn thumbnail_wins_over_everything() {
        let raw = item(
            r#"<media:thumbnail url="https://img.test/thumb.jpg"/>
               <media:content url="https://img.test/1280.jpg" width="1280"/>
               <enclosure url="https://img.test/enc.jpg" type="image/jpeg"/>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/thumb.jpg"));
    }

    #[test]
    fn width_1280_beats_entry_order() {
        let raw = item(
            r#"<media:content url="https://img.test/small.jpg" width="640"/>
               <media:content url="https://img.test/big.jpg" width="1280"/>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/big.jpg"));
    }

    #[test]
    fn url_containing_1280_is_preferred() {
        let raw = item(
            r#"<media:content url="https://img.test/a-640.jpg"/>
               <media:content url="https://img.test/a-1280x720.jpg"/>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/a-1280x720.jpg"));
    }

    #[test]
    fn first_content_when_no_1280() {
        let raw = item(
            r#"<media:content url="https://img.test/first.jpg" width="640"/>
               <media:content url="https://img.test/second.jpg" width="800"/>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/first.jpg"));
    }

    #[test]
    fn width_is_compared_as_string() {
        let raw = item(
            r#"<media:content url="https://img.test/first.jpg" width="640"/>
               <media:content url="https://img.test/second.jpg" width="1280.0"/>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/first.jpg"));
    }

    #[test]
    fn media_group_contents_are_found() {
        let raw = item(
            r#"<media:group>
                 <media:content url="https://img.test/g-640.jpg" width="640"/>
                 <media:content url="https://img.test/g-big.jpg" width="1280"/>
               </media:group>"#,
        );
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/g-big.jpg"));
    }

    #[test]
    fn enclosure_is_last_resort() {
        let raw = item(r#"<enclosure url="https://img.test/enc.jpg" length="0" type="image/jpeg"/>"#);
        assert_eq!(raw.resolve_image().as_deref(), Some("https://img.test/enc.jpg"));
    }

    #[test]
    fn no_image_source_is_dropped() {
        let raw = item("<title>Soup</title><link>https://r.test/soup</link>");
        assert_eq!(raw.resolve_image(), None);
        assert_eq!(normalize_item(&raw, &drop_policy(), now()), None);
    }

    #[test]
    fn no_image_source_gets_placeholder_when_configured() {
        let raw = item("<title>Soup</title>");
        let options = NormalizeOptions {
            image_policy: ImagePolicy::Placeholder,
            ..drop_policy()
        };
        let card = normalize_item(&raw, &options, now()).unwrap();
        assert_eq!(card.image, "/images/recipe-placeholder.jpg");
        assert_eq!(card.title, "Soup");
    }

    #[test]
    fn defaults_are_applied() {
        let raw = item(r#"<enclosure url="https://img.test/enc.jpg"/>"#);
        let card = normalize_item(&raw, &drop_policy(), now()).unwrap();
        assert_eq!(card.title, UNTITLED);
        assert_eq!(card.link, "#");
        assert_eq!(card.description, "");
        assert_eq!(card.pub_date, "2026-10-18T12:00:00.000Z");
    }

    #[test]
    fn short_description_is_unchanged() {
        let text = "a".repeat(DESCRIPTION_LIMIT);
        assert_eq!(sanitize_description(&text), text);
    }

    #[test]
    fn long_description_is_truncated_to_163() {
        let text = "b".repeat(DESCRIPTION_LIMIT + 40);
        let out = sanitize_description(&text);
        assert_eq!(out.chars().count(), DESCRIPTION_LIMIT + 3);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..DESCRIPTION_LIMIT], &text[..DESCRIPTION_LIMIT]);
    }

    #[test]
    fn tags_are_removed_before_measuring() {
        let inner = "c".repeat(150);
        let html = format!("<p class=\"lead\">{inner}</p><br/>");
        assert_eq!(sanitize_description(&html), inner);
    }

    #[test]
    fn tags_spanning_lines_are_removed() {
        assert_eq!(sanitize_description("<a\n href=\"x\">Pie</a>"), "Pie");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(DESCRIPTION_LIMIT + 1);
        let out = sanitize_description(&text);
        assert_eq!(out.chars().count(), DESCRIPTION_LIMIT + 3);
    }

    #[test]
    fn content_encoded_backs_up_description() {
        let raw = item("<content:encoded><![CDATA[<p>Slow cooked</p>]]></content:encoded>");
        assert_eq!(raw.description.as_deref(), Some("<p>Slow cooked</p>"));
    }

    #[test]
    fn feed_order_is_preserved() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>One</title><enclosure url="https://img.test/1.jpg"/></item>
            <item><title>No image</title></item>
            <item><title>Two</title><enclosure url="https://img.test/2.jpg"/></item>
            <item><title>Two</title><enclosure url="https://img.test/2.jpg"/></item>
        </channel></rss>"#;

        let cards = normalize_items(&parse_items(xml).unwrap(), &drop_policy(), now());
        let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Two"]);
    }

    #[test]
    fn card_serializes_pub_date_in_camel_case() {
        let card = RecipeCard {
            title: "t".into(),
            image: "i".into(),
            description: "d".into(),
            link: "#".into(),
            pub_date: "2026-10-18T12:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["pubDate"], "2026-10-18T12:00:00.000Z");
    }
}
