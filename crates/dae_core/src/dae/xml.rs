//! Small helpers over `roxmltree` nodes shared by the section parsers.

use std::str::FromStr;

use super::error::{ParseError, ParseResult};

pub(crate) type XmlNode<'a, 'input> = roxmltree::Node<'a, 'input>;

/// Element children only (text, comments and processing instructions skipped).
pub(crate) fn element_children<'a, 'input>(
    node: XmlNode<'a, 'input>,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Tag name without namespace.
pub(crate) fn tag<'a>(node: XmlNode<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Fail unless `node` is a `<name>` element.
pub(crate) fn expect_tag(node: XmlNode<'_, '_>, name: &str) -> ParseResult<()> {
    if tag(node) != name {
        return Err(ParseError::malformed(format!(
            "expected <{}>, found <{}>",
            name,
            tag(node)
        )));
    }
    Ok(())
}

/// Short element description for error messages, e.g. `<source id="Cube-positions">`.
pub(crate) fn describe(node: XmlNode<'_, '_>) -> String {
    match node.attribute("id") {
        Some(id) => format!("<{} id=\"{}\">", tag(node), id),
        None => format!("<{}>", tag(node)),
    }
}

pub(crate) fn required_attribute<'a>(node: XmlNode<'a, '_>, name: &str) -> ParseResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        ParseError::malformed(format!(
            "{} is missing required attribute '{}'",
            describe(node),
            name
        ))
    })
}

/// Parse an optional attribute, failing only when it is present but invalid.
pub(crate) fn parse_attribute<T: FromStr>(node: XmlNode<'_, '_>, name: &str) -> ParseResult<Option<T>> {
    match node.attribute(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ParseError::malformed(format!(
                "{} has invalid value '{}' for attribute '{}'",
                describe(node),
                raw,
                name
            ))
        }),
        None => Ok(None),
    }
}

pub(crate) fn required_parsed_attribute<T: FromStr>(node: XmlNode<'_, '_>, name: &str) -> ParseResult<T> {
    parse_attribute(node, name)?.ok_or_else(|| {
        ParseError::malformed(format!(
            "{} is missing required attribute '{}'",
            describe(node),
            name
        ))
    })
}

/// URL attribute with the leading `#` of a local fragment stripped.
pub(crate) fn required_url<'a>(node: XmlNode<'a, '_>, name: &str) -> ParseResult<&'a str> {
    required_attribute(node, name).map(strip_url)
}

pub(crate) fn strip_url(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

/// First element child with the given tag.
pub(crate) fn child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> Option<XmlNode<'a, 'input>> {
    element_children(node).find(|c| tag(*c) == name)
}

pub(crate) fn required_child<'a, 'input>(
    node: XmlNode<'a, 'input>,
    name: &str,
) -> ParseResult<XmlNode<'a, 'input>> {
    child(node, name).ok_or_else(|| {
        ParseError::malformed(format!("{} is missing required <{}>", describe(node), name))
    })
}

/// Text content of an element, empty when it has none.
pub(crate) fn text<'a>(node: XmlNode<'a, '_>) -> &'a str {
    node.text().unwrap_or("")
}

/// Parse every whitespace-separated token of the element's text.
pub(crate) fn parse_list<T: FromStr>(node: XmlNode<'_, '_>) -> ParseResult<Vec<T>> {
    text(node)
        .split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                ParseError::malformed(format!("{} contains invalid value '{}'", describe(node), token))
            })
        })
        .collect()
}

/// Parse a list that must hold exactly `expected` tokens.
pub(crate) fn parse_list_exact<T: FromStr>(node: XmlNode<'_, '_>, expected: usize) -> ParseResult<Vec<T>> {
    let values = parse_list(node)?;
    if values.len() != expected {
        return Err(ParseError::malformed(format!(
            "{} holds {} values, expected {}",
            describe(node),
            values.len(),
            expected
        )));
    }
    Ok(values)
}
