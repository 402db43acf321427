//! `<library_effects>` and `<library_materials>` parsing.
//!
//! Only the `profile_COMMON` phong shading model is understood. Colors are
//! captured as RGBA, texture references as strings; images are never loaded.

use dae_math::Vec4;

use super::error::{ParseError, ParseResult};
use super::xml::{self, XmlNode};

/// A phong color parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorSource {
    /// Literal RGBA
    Color(Vec4),

    /// Sampler reference and texcoord set symbol
    Texture { texture: String, texcoord: String },
}

impl ColorSource {
    /// The literal color, if this parameter is not textured.
    pub fn color(&self) -> Option<Vec4> {
        match self {
            ColorSource::Color(rgba) => Some(*rgba),
            ColorSource::Texture { .. } => None,
        }
    }
}

/// Parameters of a `<phong>` technique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhongModel {
    pub emission: Option<ColorSource>,
    pub ambient: Option<ColorSource>,
    pub diffuse: Option<ColorSource>,
    pub specular: Option<ColorSource>,
    pub shininess: Option<f32>,
    pub reflective: Option<ColorSource>,
    pub reflectivity: Option<f32>,
    pub transparent: Option<ColorSource>,
    pub transparency: Option<f32>,
    pub index_of_refraction: Option<f32>,
}

/// Shading model of an effect.
#[derive(Clone, Debug, PartialEq)]
pub enum LightingModel {
    Phong(PhongModel),
}

/// An `<effect>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct Effect {
    pub id: String,
    pub name: String,
    pub lighting: LightingModel,
}

impl Effect {
    /// Phong parameters; every supported effect is phong.
    pub fn phong(&self) -> &PhongModel {
        match &self.lighting {
            LightingModel::Phong(phong) => phong,
        }
    }
}

/// A `<material>` element before its effect is linked.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDef {
    pub id: String,
    pub name: String,

    /// Id of the instanced effect, `#` stripped
    pub effect_url: String,
}

/// Parse an `<effect>` element.
pub fn parse_effect(node: XmlNode<'_, '_>) -> ParseResult<Effect> {
    xml::expect_tag(node, "effect")?;
    let id = xml::required_attribute(node, "id")?;

    let mut lighting = None;
    for child in xml::element_children(node) {
        match xml::tag(child) {
            "profile_COMMON" => lighting = Some(parse_profile_common(id, child)?),
            "asset" | "annotate" | "image" | "newparam" | "extra" => {}
            other => {
                return Err(ParseError::unsupported(format!(
                    "effect '{}': profile <{}> is not supported",
                    id, other
                )))
            }
        }
    }

    let lighting =
        lighting.ok_or_else(|| ParseError::malformed(format!("effect '{}' has no profile_COMMON technique", id)))?;

    Ok(Effect {
        id: id.to_string(),
        name: node.attribute("name").unwrap_or(id).to_string(),
        lighting,
    })
}

fn parse_profile_common(id: &str, node: XmlNode<'_, '_>) -> ParseResult<LightingModel> {
    let technique = xml::required_child(node, "technique")?;

    let mut lighting = None;
    for child in xml::element_children(technique) {
        match xml::tag(child) {
            "phong" => lighting = Some(LightingModel::Phong(parse_phong(child)?)),
            "asset" | "extra" => {}
            other => {
                return Err(ParseError::unsupported(format!(
                    "effect '{}': <{}> shading is not supported",
                    id, other
                )))
            }
        }
    }

    lighting.ok_or_else(|| ParseError::malformed(format!("effect '{}' technique has no shading model", id)))
}

fn parse_phong(node: XmlNode<'_, '_>) -> ParseResult<PhongModel> {
    let mut phong = PhongModel::default();

    for param in xml::element_children(node) {
        match xml::tag(param) {
            "emission" => phong.emission = Some(parse_color_source(param)?),
            "ambient" => phong.ambient = Some(parse_color_source(param)?),
            "diffuse" => phong.diffuse = Some(parse_color_source(param)?),
            "specular" => phong.specular = Some(parse_color_source(param)?),
            "shininess" => phong.shininess = Some(parse_float_param(param)?),
            "reflective" => phong.reflective = Some(parse_color_source(param)?),
            "reflectivity" => phong.reflectivity = Some(parse_float_param(param)?),
            "transparent" => phong.transparent = Some(parse_color_source(param)?),
            "transparency" => phong.transparency = Some(parse_float_param(param)?),
            "index_of_refraction" => phong.index_of_refraction = Some(parse_float_param(param)?),
            other => log::debug!("phong: skipping <{}>", other),
        }
    }

    Ok(phong)
}

fn parse_color_source(param: XmlNode<'_, '_>) -> ParseResult<ColorSource> {
    if let Some(color) = xml::child(param, "color") {
        let rgba: Vec<f32> = xml::parse_list(color)?;
        return match rgba.as_slice() {
            [r, g, b, a] => Ok(ColorSource::Color(Vec4::new(*r, *g, *b, *a))),
            [r, g, b] => Ok(ColorSource::Color(Vec4::new(*r, *g, *b, 1.0))),
            _ => Err(ParseError::malformed(format!(
                "<{}> color needs 3 or 4 components",
                xml::tag(param)
            ))),
        };
    }
    if let Some(texture) = xml::child(param, "texture") {
        return Ok(ColorSource::Texture {
            texture: xml::required_attribute(texture, "texture")?.to_string(),
            texcoord: texture.attribute("texcoord").unwrap_or_default().to_string(),
        });
    }
    Err(ParseError::malformed(format!(
        "<{}> has neither <color> nor <texture>",
        xml::tag(param)
    )))
}

fn parse_float_param(param: XmlNode<'_, '_>) -> ParseResult<f32> {
    let value = xml::required_child(param, "float")?;
    let values: Vec<f32> = xml::parse_list_exact(value, 1)?;
    Ok(values[0])
}

/// Parse a `<material>` element.
pub fn parse_material(node: XmlNode<'_, '_>) -> ParseResult<MaterialDef> {
    xml::expect_tag(node, "material")?;
    let id = xml::required_attribute(node, "id")?;
    let instance = xml::required_child(node, "instance_effect")?;

    Ok(MaterialDef {
        id: id.to_string(),
        name: node.attribute("name").unwrap_or(id).to_string(),
        effect_url: xml::required_url(instance, "url")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFFECT: &str = r#"
<effect id="Material-effect">
  <profile_COMMON>
    <newparam sid="Image-surface"><surface type="2D"/></newparam>
    <technique sid="common">
      <phong>
        <emission><color sid="emission">0 0 0 1</color></emission>
        <diffuse><texture texture="Image-sampler" texcoord="UVMap"/></diffuse>
        <specular><color sid="specular">0.5 0.5 0.5 1</color></specular>
        <shininess><float sid="shininess">50</float></shininess>
        <index_of_refraction><float sid="index_of_refraction">1.45</float></index_of_refraction>
      </phong>
    </technique>
  </profile_COMMON>
</effect>"#;

    fn parse(text: &str) -> ParseResult<Effect> {
        let doc = roxmltree::Document::parse(text).unwrap();
        parse_effect(doc.root_element())
    }

    #[test]
    fn test_parse_phong_effect() {
        let effect = parse(EFFECT).unwrap();
        let phong = effect.phong();

        assert_eq!(effect.name, "Material-effect");
        assert_eq!(phong.emission.as_ref().unwrap().color(), Some(Vec4::new(0.0, 0.0, 0.0, 1.0)));
        assert_eq!(
            phong.diffuse,
            Some(ColorSource::Texture {
                texture: "Image-sampler".to_string(),
                texcoord: "UVMap".to_string()
            })
        );
        assert!((phong.shininess.unwrap() - 50.0).abs() < 0.001);
        assert!((phong.index_of_refraction.unwrap() - 1.45).abs() < 0.001);
        assert!(phong.ambient.is_none());
    }

    #[test]
    fn test_lambert_is_unsupported() {
        let text = EFFECT.replace("<phong>", "<lambert>").replace("</phong>", "</lambert>");
        assert!(matches!(parse(&text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_other_profile_is_unsupported() {
        let text = r#"<effect id="e"><profile_GLSL/></effect>"#;
        assert!(matches!(parse(text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_parse_material() {
        let doc = roxmltree::Document::parse(
            r##"<material id="Red-material" name="Red"><instance_effect url="#Red-effect"/></material>"##,
        )
        .unwrap();
        let material = parse_material(doc.root_element()).unwrap();

        assert_eq!(material.name, "Red");
        assert_eq!(material.effect_url, "Red-effect");
    }
}
