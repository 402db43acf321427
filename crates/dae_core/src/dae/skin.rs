//! `<library_controllers>` parsing and joint weight resolution.
//!
//! A controller's `<skin>` pairs joint names with inverse bind matrices and
//! lists, per mesh vertex, a variable number of (joint, weight) influences.
//! [`SkinDef::generate_joint_buffer`] flattens those influences into a
//! fixed-width record per vertex so they can be interleaved into a vertex
//! buffer.

use std::collections::HashMap;

use dae_math::{Mat4, Mat4Ext};

use super::error::{ParseError, ParseResult, RefKind};
use super::geometry::{index_count, parse_inputs, tuple_width, vertex_total, Input};
use super::source::{parse_source, Source};
use super::xml::{self, XmlNode};

/// A skeleton joint as seen by a skin.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    /// Position in the skin's joint list; this is the value written into
    /// the joint slots of the vertex buffer
    pub index: usize,

    /// Joint name, matching a scene node's sid (or id)
    pub name: String,

    /// Inverse bind matrix
    pub bind_pose_matrix: Mat4,
}

/// The `<vertex_weights>` of a skin.
#[derive(Clone, Debug, Default)]
pub struct VertexWeights {
    pub inputs: Vec<Input>,

    /// Influence count per mesh vertex
    pub vcount: Vec<usize>,

    /// Interleaved per-influence indices, `stride` per influence
    pub v_indexes: Vec<i64>,

    /// Largest entry of `vcount`
    pub max_vcount: usize,
}

impl VertexWeights {
    fn input(&self, semantic: &str) -> ParseResult<&Input> {
        self.inputs
            .iter()
            .find(|i| i.semantic == semantic)
            .ok_or_else(|| ParseError::malformed(format!("<vertex_weights> has no {} input", semantic)))
    }

    /// Index slots per influence.
    pub fn stride(&self) -> usize {
        tuple_width(&self.inputs)
    }
}

/// An unresolved `<skin>`.
#[derive(Clone, Debug)]
pub struct SkinDef {
    /// Id of the geometry this skin deforms
    pub source_id: String,
    pub sources: HashMap<String, Source>,
    pub bind_shape_matrix: Mat4,

    /// `<joints>` inputs: semantic → source id
    pub joints: HashMap<String, String>,
    pub vertex_weights: VertexWeights,

    /// Joint name → joint
    pub joint_bones: HashMap<String, Joint>,
}

/// A `<controller>` element.
#[derive(Clone, Debug)]
pub struct ControllerDef {
    pub id: String,
    pub name: String,
    pub skin: SkinDef,
}

/// Fixed-width joint/weight records, one per mesh vertex.
///
/// Each record holds `max_influences` pairs of (joint index, weight), zero
/// padded past the vertex's real influence count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointBuffer {
    pub max_influences: usize,
    pub data: Vec<f32>,
}

impl JointBuffer {
    /// Floats per vertex record.
    pub fn record_len(&self) -> usize {
        self.max_influences * 2
    }

    /// The record for a mesh vertex (a position index).
    pub fn record(&self, vertex: usize) -> Option<&[f32]> {
        let len = self.record_len();
        self.data.get(vertex * len..(vertex + 1) * len)
    }

    pub fn vertex_count(&self) -> usize {
        match self.record_len() {
            0 => 0,
            len => self.data.len() / len,
        }
    }
}

impl SkinDef {
    pub fn source(&self, id: &str) -> ParseResult<&Source> {
        self.sources
            .get(id)
            .ok_or_else(|| ParseError::unresolved(RefKind::Source, id))
    }

    fn joint_source(&self, semantic: &str) -> ParseResult<&Source> {
        let id = self
            .joints
            .get(semantic)
            .ok_or_else(|| ParseError::malformed(format!("<joints> has no {} input", semantic)))?;
        self.source(id)
    }

    /// Joints ordered by index.
    pub fn ordered_joints(&self) -> Vec<&Joint> {
        let mut joints: Vec<&Joint> = self.joint_bones.values().collect();
        joints.sort_by_key(|j| j.index);
        joints
    }

    /// Flatten the variable-length influence lists into a [`JointBuffer`].
    pub fn generate_joint_buffer(&self) -> ParseResult<JointBuffer> {
        let weights = &self.vertex_weights;
        let joint_input = weights.input("JOINT")?;
        let weight_input = weights.input("WEIGHT")?;
        let names = self.source(&joint_input.source)?.expect_names()?;
        let weight_values = self.source(&weight_input.source)?.expect_floats()?;

        let max = weights.max_vcount;
        let stride = weights.stride();
        let mut data = Vec::with_capacity(weights.vcount.len() * max * 2);
        let mut cursor = 0;

        for (vertex, &count) in weights.vcount.iter().enumerate() {
            for _ in 0..count {
                let tuple = weights
                    .v_indexes
                    .get(cursor..cursor + stride)
                    .ok_or_else(|| ParseError::malformed("<v> ends before the influences <vcount> declares"))?;
                cursor += stride;

                let joint = match tuple[joint_input.offset] {
                    -1 => 0,
                    raw => {
                        let name = usize::try_from(raw)
                            .ok()
                            .and_then(|i| names.get(i))
                            .ok_or_else(|| {
                                ParseError::malformed(format!(
                                    "vertex {} references joint index {} out of range",
                                    vertex, raw
                                ))
                            })?;
                        self.joint_bones
                            .get(name)
                            .ok_or_else(|| ParseError::malformed(format!("joint '{}' has no bind pose", name)))?
                            .index
                    }
                };

                let raw_weight = tuple[weight_input.offset];
                let weight = usize::try_from(raw_weight)
                    .ok()
                    .and_then(|i| weight_values.get(i))
                    .ok_or_else(|| {
                        ParseError::malformed(format!(
                            "vertex {} references weight index {} out of range",
                            vertex, raw_weight
                        ))
                    })?;

                data.push(joint as f32);
                data.push(*weight);
            }
            data.extend(std::iter::repeat(0.0).take((max - count) * 2));
        }

        Ok(JointBuffer {
            max_influences: max,
            data,
        })
    }
}

/// Parse a `<controller>` element.
pub fn parse_controller(node: XmlNode<'_, '_>) -> ParseResult<ControllerDef> {
    xml::expect_tag(node, "controller")?;
    let id = xml::required_attribute(node, "id")?;
    let name = node.attribute("name").unwrap_or(id);

    let mut skin = None;
    for child in xml::element_children(node) {
        match xml::tag(child) {
            "skin" if skin.is_none() => skin = Some(parse_skin(child)?),
            "skin" => {
                return Err(ParseError::unsupported(format!(
                    "controller '{}' has more than one <skin>",
                    id
                )))
            }
            "morph" => {
                return Err(ParseError::unsupported(format!(
                    "controller '{}': <morph> is not supported",
                    id
                )))
            }
            _ => {}
        }
    }

    let skin = skin.ok_or_else(|| ParseError::malformed(format!("controller '{}' has no <skin>", id)))?;
    log::debug!(
        "controller '{}': skin of '{}' with {} joints, up to {} influences",
        id,
        skin.source_id,
        skin.joint_bones.len(),
        skin.vertex_weights.max_vcount
    );

    Ok(ControllerDef {
        id: id.to_string(),
        name: name.to_string(),
        skin,
    })
}

fn parse_skin(node: XmlNode<'_, '_>) -> ParseResult<SkinDef> {
    let mut skin = SkinDef {
        source_id: xml::required_url(node, "source")?.to_string(),
        sources: HashMap::new(),
        bind_shape_matrix: Mat4::IDENTITY,
        joints: HashMap::new(),
        vertex_weights: VertexWeights::default(),
        joint_bones: HashMap::new(),
    };
    let mut have_weights = false;

    for child in xml::element_children(node) {
        match xml::tag(child) {
            "bind_shape_matrix" => {
                let values: Vec<f32> = xml::parse_list_exact(child, 16)?;
                skin.bind_shape_matrix = Mat4::try_from_row_major_slice(&values)
                    .ok_or_else(|| ParseError::malformed("<bind_shape_matrix> needs 16 values"))?;
            }
            "source" => {
                let source = parse_source(child)?;
                skin.sources.insert(source.id.clone(), source);
            }
            "joints" => {
                skin.joints = parse_inputs(child)?
                    .into_iter()
                    .map(|input| (input.semantic, input.source))
                    .collect();
            }
            "vertex_weights" if have_weights => {
                return Err(ParseError::unsupported(format!(
                    "skin of '{}' has more than one <vertex_weights>",
                    skin.source_id
                )))
            }
            "vertex_weights" => {
                skin.vertex_weights = parse_vertex_weights(child)?;
                have_weights = true;
            }
            _ => {}
        }
    }

    if !have_weights {
        return Err(ParseError::malformed(format!(
            "skin of '{}' has no <vertex_weights>",
            skin.source_id
        )));
    }
    for input in &skin.vertex_weights.inputs {
        skin.source(&input.source)?;
    }
    skin.joint_bones = build_joints(&skin)?;

    Ok(skin)
}

fn parse_vertex_weights(node: XmlNode<'_, '_>) -> ParseResult<VertexWeights> {
    let count: usize = xml::required_parsed_attribute(node, "count")?;
    let inputs = parse_inputs(node)?;
    let vcount: Vec<usize> = match xml::child(node, "vcount") {
        Some(vcount) => xml::parse_list_exact(vcount, count)?,
        None if count == 0 => Vec::new(),
        None => return Err(ParseError::malformed("<vertex_weights> is missing <vcount>")),
    };

    let expected = index_count(node, vertex_total(node, &vcount)?, &inputs)?;
    let v_indexes = match xml::child(node, "v") {
        Some(v) => xml::parse_list_exact(v, expected)?,
        None if expected == 0 => Vec::new(),
        None => return Err(ParseError::malformed("<vertex_weights> is missing <v>")),
    };

    Ok(VertexWeights {
        max_vcount: vcount.iter().copied().max().unwrap_or(0),
        inputs,
        vcount,
        v_indexes,
    })
}

/// Zip the JOINT names with the INV_BIND_MATRIX matrices.
fn build_joints(skin: &SkinDef) -> ParseResult<HashMap<String, Joint>> {
    let names = skin.joint_source("JOINT")?.expect_names()?;
    let matrices = skin.joint_source("INV_BIND_MATRIX")?.expect_matrices()?;
    if names.len() != matrices.len() {
        return Err(ParseError::malformed(format!(
            "skin of '{}' has {} joint names but {} bind matrices",
            skin.source_id,
            names.len(),
            matrices.len()
        )));
    }

    let mut joints = HashMap::with_capacity(names.len());
    for (index, (name, matrix)) in names.iter().zip(matrices).enumerate() {
        let joint = Joint {
            index,
            name: name.clone(),
            bind_pose_matrix: *matrix,
        };
        if joints.insert(name.clone(), joint).is_some() {
            return Err(ParseError::malformed(format!(
                "skin of '{}' lists joint '{}' twice",
                skin.source_id, name
            )));
        }
    }
    Ok(joints)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER: &str = r##"
<controller id="Armature_Plane-skin" name="Armature">
  <skin source="#Plane-mesh">
    <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
    <source id="joints">
      <Name_array count="2">Root Tip</Name_array>
      <technique_common><accessor count="2"/></technique_common>
    </source>
    <source id="bind_poses">
      <float_array count="32">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1 1 0 0 0 0 1 0 -1 0 0 1 0 0 0 0 1</float_array>
      <technique_common><accessor count="2" stride="16"/></technique_common>
    </source>
    <source id="weights">
      <float_array count="3">1 0.25 0.75</float_array>
      <technique_common><accessor count="3"/></technique_common>
    </source>
    <joints>
      <input semantic="JOINT" source="#joints"/>
      <input semantic="INV_BIND_MATRIX" source="#bind_poses"/>
    </joints>
    <vertex_weights count="3">
      <input semantic="JOINT" source="#joints" offset="0"/>
      <input semantic="WEIGHT" source="#weights" offset="1"/>
      <vcount>1 2 0</vcount>
      <v>0 0 0 1 1 2</v>
    </vertex_weights>
  </skin>
</controller>"##;

    fn parse(text: &str) -> ParseResult<ControllerDef> {
        let doc = roxmltree::Document::parse(text).unwrap();
        parse_controller(doc.root_element())
    }

    #[test]
    fn test_parse_controller() {
        let controller = parse(CONTROLLER).unwrap();
        let skin = &controller.skin;

        assert_eq!(controller.name, "Armature");
        assert_eq!(skin.source_id, "Plane-mesh");
        assert_eq!(skin.vertex_weights.max_vcount, 2);
        assert_eq!(skin.joint_bones["Tip"].index, 1);
        let names: Vec<&str> = skin.ordered_joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Tip"]);
    }

    #[test]
    fn test_joint_buffer_is_zero_padded() {
        let controller = parse(CONTROLLER).unwrap();
        let buffer = controller.skin.generate_joint_buffer().unwrap();

        assert_eq!(buffer.max_influences, 2);
        assert_eq!(buffer.vertex_count(), 3);
        assert_eq!(buffer.record(0).unwrap(), &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(buffer.record(1).unwrap(), &[0.0, 0.25, 1.0, 0.75]);
        assert_eq!(buffer.record(2).unwrap(), &[0.0, 0.0, 0.0, 0.0]);
        assert!(buffer.record(3).is_none());
    }

    #[test]
    fn test_bind_shape_joint_writes_slot_zero() {
        let text = CONTROLLER.replace("<v>0 0 0 1 1 2</v>", "<v>-1 0 0 1 1 2</v>");
        let buffer = parse(&text).unwrap().skin.generate_joint_buffer().unwrap();

        assert_eq!(buffer.record(0).unwrap(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_joint_is_malformed() {
        let text = CONTROLLER.replace("<v>0 0 0 1 1 2</v>", "<v>7 0 0 1 1 2</v>");
        let result = parse(&text).unwrap().skin.generate_joint_buffer();

        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_weight_count_overflow_is_malformed() {
        let text = CONTROLLER.replace("<vcount>1 2 0</vcount>", "<vcount>1 2 18446744073709551615</vcount>");
        assert!(matches!(parse(&text), Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_second_vertex_weights_is_unsupported() {
        let weights = "<vertex_weights count=\"0\"><input semantic=\"JOINT\" source=\"#joints\" offset=\"0\"/></vertex_weights>";
        let text = CONTROLLER.replace("</skin>", &format!("{}</skin>", weights));

        assert!(matches!(parse(&text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_morph_is_unsupported() {
        let text = r##"<controller id="m"><morph source="#Plane-mesh"/></controller>"##;
        assert!(matches!(parse(text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_joint_and_matrix_counts_must_match() {
        let text = CONTROLLER
            .replace("<Name_array count=\"2\">Root Tip</Name_array>", "<Name_array count=\"3\">Root Tip End</Name_array>")
            .replace("<technique_common><accessor count=\"2\"/></technique_common>", "<technique_common><accessor count=\"3\"/></technique_common>");

        assert!(matches!(parse(&text), Err(ParseError::MalformedDocument(_))));
    }
}
