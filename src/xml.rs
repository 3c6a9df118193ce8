//! Generic element tree for RSS documents.
//!
//! The tree is deliberately schema-free: every element keeps its local name,
//! namespace URI, string attributes, trimmed text and children. Repeatable
//! elements are always reached through [`XmlNode::children_named`], so a feed
//! with one `<item>` or one `<media:content>` looks the same as one with many.

use std::collections::HashMap;

use crate::error::{FeedError, Result};

pub const MEDIA_NS: &str = "http://search.yahoo.com/mrss/";
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_element(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();

        let mut text = String::new();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(XmlNode::from_element(child));
            } else if child.is_text() {
                if let Some(t) = child.text() {
                    text.push_str(t);
                }
            }
        }

        XmlNode {
            name: node.tag_name().name().to_string(),
            namespace: node.tag_name().namespace().map(str::to_string),
            attributes,
            text: text.trim().to_string(),
            children,
        }
    }

    /// True for an element with this local name in the given namespace.
    /// `None` matches elements outside any namespace, which is where plain RSS lives.
    pub fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && same_namespace(self.namespace.as_deref(), namespace)
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children
            .iter()
            .filter(move |child| child.is(namespace, name))
    }

    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.is(namespace, name))
    }

    /// Text of the first matching child, if it is not blank.
    pub fn child_text(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.child(namespace, name)
            .map(|child| child.text.as_str())
            .filter(|text| !text.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

// Media RSS is published both with and without the trailing slash.
fn same_namespace(actual: Option<&str>, expected: Option<&str>) -> bool {
    match (actual, expected) {
        (None, None) => true,
        (Some(a), Some(e)) => a.trim_end_matches('/') == e.trim_end_matches('/'),
        _ => false,
    }
}

/// Parses an RSS 2.0 document and returns its `rss/channel/item` elements in feed order.
pub fn parse_items(xml: &str) -> Result<Vec<XmlNode>> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    if root.tag_name().name() != "rss" {
        return Err(FeedError::shape(format!(
            "expected <rss> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let channel = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "channel")
        .ok_or_else(|| FeedError::shape("missing <channel> element"))?;

    let items = channel
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "item")
        .map(XmlNode::from_element)
        .collect();

    Ok(items)
}
