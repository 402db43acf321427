//! `<library_animations>` parsing.
//!
//! Animations are captured raw: their sources, the sampler's semantic →
//! source map and the channel target. Curves are not evaluated.

use std::collections::{BTreeMap, HashMap};

use super::error::{ParseError, ParseResult, RefKind};
use super::source::{parse_source, Source};
use super::xml::{self, XmlNode};

/// An `<animation>` element.
#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub id: String,
    pub name: String,
    pub sources: HashMap<String, Source>,

    /// Sampler input semantic (INPUT, OUTPUT, INTERPOLATION, ...) → source id
    pub sampler: BTreeMap<String, String>,

    /// Channel target, e.g. `Bone/transform`
    pub channel_target: Option<String>,
}

impl Animation {
    /// The source feeding a sampler semantic.
    pub fn sampler_source(&self, semantic: &str) -> Option<&Source> {
        self.sampler.get(semantic).and_then(|id| self.sources.get(id))
    }
}

/// Parse an `<animation>` element into `out`.
///
/// Nested animations are flattened into the same map. Grouping animations
/// without an id are not stored themselves.
pub fn parse_animation(node: XmlNode<'_, '_>, out: &mut HashMap<String, Animation>) -> ParseResult<()> {
    xml::expect_tag(node, "animation")?;

    let mut animation = Animation {
        id: node.attribute("id").unwrap_or_default().to_string(),
        name: node.attribute("name").unwrap_or_default().to_string(),
        ..Default::default()
    };

    for child in xml::element_children(node) {
        match xml::tag(child) {
            "source" => {
                let source = parse_source(child)?;
                animation.sources.insert(source.id.clone(), source);
            }
            "sampler" => {
                for input in xml::element_children(child).filter(|c| xml::tag(*c) == "input") {
                    animation.sampler.insert(
                        xml::required_attribute(input, "semantic")?.to_string(),
                        xml::required_url(input, "source")?.to_string(),
                    );
                }
            }
            "channel" => {
                animation.channel_target = Some(xml::required_attribute(child, "target")?.to_string());
            }
            "animation" => parse_animation(child, out)?,
            "asset" | "extra" => {}
            other => {
                return Err(ParseError::unsupported(format!(
                    "animation '{}': <{}> is not supported",
                    animation.id, other
                )))
            }
        }
    }

    for source in animation.sampler.values() {
        if !animation.sources.contains_key(source) {
            return Err(ParseError::unresolved(RefKind::Source, source.as_str()));
        }
    }

    if animation.id.is_empty() {
        if !animation.sources.is_empty() {
            log::warn!("skipping animation without id ({} sources)", animation.sources.len());
        }
        return Ok(());
    }
    if out.contains_key(&animation.id) {
        return Err(ParseError::malformed(format!("animation '{}' declared twice", animation.id)));
    }

    log::debug!(
        "animation '{}': {} sources, target {:?}",
        animation.id,
        animation.sources.len(),
        animation.channel_target
    );
    out.insert(animation.id.clone(), animation);
    Ok(())
}
