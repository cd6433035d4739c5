//! Flat element index over a parsed markup tree.
//!
//! [`MarkupDocument`] records every element with its parent link, attribute
//! spans and content span. All spans are byte ranges into the parsed source,
//! which lets callers splice replacements without re-serialising the tree.

use std::ops::Range;

use crate::error::MarkupError;
use crate::parser::{MarkupParser, ParseResult};
use crate::position::point_to_one_based;
use crate::selector::Selector;

/// Elements that never have content or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const ELEMENT_KINDS: &[&str] = &["element", "script_element", "style_element"];

/// An attribute on an element's start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    range: Range<usize>,
    value: Option<AttributeValue>,
}

impl Attribute {
    /// Attribute name, lower-cased.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte range of the whole attribute, name through closing quote.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The value, if the attribute has one.
    #[must_use]
    pub const fn value(&self) -> Option<&AttributeValue> {
        self.value.as_ref()
    }

    /// The value text, or an empty string for bare attributes.
    #[must_use]
    pub fn value_text(&self) -> &str {
        self.value.as_ref().map_or("", |value| value.text.as_str())
    }
}

/// The value part of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    text: String,
    range: Range<usize>,
    quote: Option<char>,
}

impl AttributeValue {
    /// The raw value text, without quotes.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte range of the value text, excluding quotes.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The quote character delimiting the value, if any.
    #[must_use]
    pub const fn quote(&self) -> Option<char> {
        self.quote
    }
}

/// An element found in the parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    parent: Option<usize>,
    tag_name: String,
    attributes: Vec<Attribute>,
    range: Range<usize>,
    content: Option<Range<usize>>,
    attribute_insertion_point: usize,
    line: u32,
    column: u32,
}

impl Element {
    /// Tag name, lower-cased.
    #[must_use]
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Attributes in source order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by case-insensitive name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
    }

    /// Byte range of the whole element.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Byte range between the start tag and the end tag.
    ///
    /// `None` for void and self-closing elements. Elements whose end tag was
    /// omitted report content up to the end of the element.
    #[must_use]
    pub fn content_range(&self) -> Option<Range<usize>> {
        self.content.clone()
    }

    /// Byte offset at which a new attribute can be inserted, directly after
    /// the last existing attribute (or the tag name).
    #[must_use]
    pub const fn attribute_insertion_point(&self) -> usize {
        self.attribute_insertion_point
    }

    /// One-based line of the start tag.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// One-based column of the start tag.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Index of the parent element within the owning document.
    #[must_use]
    pub const fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    /// Whether the `class` attribute contains the token `class`.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|attribute| attribute.value_text().split_whitespace().any(|c| c == class))
    }
}

/// Parsed markup with an index of its elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDocument {
    elements: Vec<Element>,
}

impl MarkupDocument {
    /// Parses `source` and indexes its elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the parser cannot be initialised or produces no
    /// tree.
    pub fn parse(source: &str) -> Result<Self, MarkupError> {
        let mut parser = MarkupParser::new()?;
        let parsed = parser.parse(source)?;
        Ok(Self::from_parse_result(&parsed))
    }

    /// Indexes the elements of an existing parse result.
    #[must_use]
    pub fn from_parse_result(parsed: &ParseResult) -> Self {
        let mut elements = Vec::new();
        index_elements(parsed.root_node(), parsed.source(), None, &mut elements);
        Self { elements }
    }

    /// All elements in document order.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Returns the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Returns the parent of `element`.
    #[must_use]
    pub fn parent(&self, element: &Element) -> Option<&Element> {
        element.parent.and_then(|index| self.elements.get(index))
    }

    /// Returns every element matched by `selector`, in document order.
    #[must_use]
    pub fn select(&self, selector: &Selector) -> Vec<&Element> {
        (0..self.elements.len())
            .filter(|&index| selector.matches(self, index))
            .filter_map(|index| self.elements.get(index))
            .collect()
    }
}

fn index_elements(
    node: tree_sitter::Node<'_>,
    source: &str,
    parent: Option<usize>,
    elements: &mut Vec<Element>,
) {
    let mut current_parent = parent;
    if ELEMENT_KINDS.contains(&node.kind())
        && let Some(element) = build_element(node, source, parent)
    {
        current_parent = Some(elements.len());
        elements.push(element);
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        index_elements(child, source, current_parent, elements);
    }
}

fn build_element(
    node: tree_sitter::Node<'_>,
    source: &str,
    parent: Option<usize>,
) -> Option<Element> {
    let mut start_tag = None;
    let mut end_tag = None;
    let mut self_closing = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "start_tag" => start_tag = Some(child),
            "self_closing_tag" => {
                start_tag = Some(child);
                self_closing = true;
            }
            "end_tag" => end_tag = Some(child),
            _ => {}
        }
    }
    let tag = start_tag?;

    let mut tag_name = String::new();
    let mut attributes = Vec::new();
    let mut insertion_point = tag.start_byte();
    let mut tag_cursor = tag.walk();
    for child in tag.named_children(&mut tag_cursor) {
        match child.kind() {
            "tag_name" => {
                tag_name = node_text(child, source).to_ascii_lowercase();
                insertion_point = child.end_byte();
            }
            "attribute" => {
                attributes.push(build_attribute(child, source));
                insertion_point = child.end_byte();
            }
            _ => {}
        }
    }

    let is_void = VOID_ELEMENTS.contains(&tag_name.as_str());
    let content = if self_closing || (is_void && end_tag.is_none()) {
        None
    } else {
        let end = end_tag.map_or_else(|| node.end_byte(), |end| end.start_byte());
        Some(tag.end_byte()..end.max(tag.end_byte()))
    };

    let (line, column) = point_to_one_based(node.start_position());
    Some(Element {
        parent,
        tag_name,
        attributes,
        range: node.byte_range(),
        content,
        attribute_insertion_point: insertion_point,
        line,
        column,
    })
}

fn build_attribute(node: tree_sitter::Node<'_>, source: &str) -> Attribute {
    let mut name = String::new();
    let mut value = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "attribute_name" => name = node_text(child, source).to_ascii_lowercase(),
            "attribute_value" => {
                value = Some(AttributeValue {
                    text: node_text(child, source).to_owned(),
                    range: child.byte_range(),
                    quote: None,
                });
            }
            "quoted_attribute_value" => value = Some(quoted_value(child, source)),
            _ => {}
        }
    }
    Attribute {
        name,
        range: node.byte_range(),
        value,
    }
}

fn quoted_value(node: tree_sitter::Node<'_>, source: &str) -> AttributeValue {
    let quote = node_text(node, source).chars().next();
    let mut cursor = node.walk();
    let inner = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "attribute_value");
    match inner {
        Some(inner_node) => AttributeValue {
            text: node_text(inner_node, source).to_owned(),
            range: inner_node.byte_range(),
            quote,
        },
        None => {
            // Empty quoted value: the span sits between the two quotes.
            let start = node.start_byte().saturating_add(1);
            AttributeValue {
                text: String::new(),
                range: start..start,
                quote,
            }
        }
    }
}

fn node_text<'s>(node: tree_sitter::Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}
