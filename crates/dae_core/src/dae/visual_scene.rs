//! `<library_visual_scenes>` parsing.
//!
//! Nodes of every visual scene live in one arena ([`SceneGraph`]); parents
//! and children refer to each other by [`NodeId`].
//!
//! # Local transforms
//!
//! A node's transform elements are composed in a fixed slot order,
//! independent of their order in the document:
//!
//! 1. `matrix`
//! 2. `translate`
//! 3. `scale`
//! 4. `rotate` about X, then Y, then Z
//! 5. any other `rotate`, in document order
//!
//! Each element is right-multiplied onto the accumulated matrix, so a point
//! is scaled and rotated before it is translated.

use std::collections::{BTreeMap, VecDeque};

use dae_math::{Mat4, Mat4Ext, Vec3};

use super::error::{ParseError, ParseResult};
use super::xml::{self, XmlNode};

/// Index of a node in a [`SceneGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// The `type` attribute of a `<node>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Node,
    Joint,
}

/// `<bind_material>`: material symbol → material id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindMaterial {
    pub symbols: BTreeMap<String, String>,
}

/// An instance attached to a scene node.
#[derive(Clone, Debug, PartialEq)]
pub enum Instance {
    /// `<instance_geometry>`
    Geometry {
        url: String,
        bind_material: BindMaterial,
    },

    /// `<instance_controller>`
    Controller {
        url: String,
        skeleton: Option<String>,
        bind_material: BindMaterial,
    },
}

impl Instance {
    /// Referenced geometry or controller id.
    pub fn reference_url(&self) -> &str {
        match self {
            Instance::Geometry { url, .. } | Instance::Controller { url, .. } => url.as_str(),
        }
    }

    pub fn bind_material(&self) -> &BindMaterial {
        match self {
            Instance::Geometry { bind_material, .. } | Instance::Controller { bind_material, .. } => bind_material,
        }
    }
}

/// A `<node>`.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sid: Option<String>,
    pub kind: NodeKind,

    /// Local transform
    pub transform: Mat4,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub instances: Vec<Instance>,
}

impl SceneNode {
    /// The best available identifier: id, then sid, then name.
    pub fn identifier(&self) -> &str {
        self.id
            .as_deref()
            .or(self.sid.as_deref())
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

/// A `<visual_scene>`: its top-level nodes.
#[derive(Clone, Debug, Default)]
pub struct VisualScene {
    pub id: String,
    pub name: String,
    pub roots: Vec<NodeId>,
}

/// Arena holding the nodes of every visual scene.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    pub scenes: Vec<VisualScene>,
}

impl SceneGraph {
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node with its id, in parse (depth-first) order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Top-level nodes of all visual scenes.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.scenes.iter().flat_map(|s| s.roots.iter().copied())
    }

    /// First node whose `id` attribute matches.
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.id.as_deref() == Some(id))
            .map(NodeId)
    }

    /// Transform from node space to scene space.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        match node.parent {
            Some(parent) => self.world_transform(parent) * node.transform,
            None => node.transform,
        }
    }

    /// The subtree under `root` in breadth-first order, `root` first.
    pub fn breadth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node(id).children.iter().copied());
        }
        order
    }

    fn push(&mut self, node: SceneNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}

/// Rotation axis slot of a `rotate` element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RotationSlot {
    X,
    Y,
    Z,
    Other,
}

impl RotationSlot {
    fn classify(sid: Option<&str>, axis: Vec3) -> Self {
        if let Some(sid) = sid {
            let sid = sid.to_ascii_lowercase();
            for (suffix, slot) in [("x", RotationSlot::X), ("y", RotationSlot::Y), ("z", RotationSlot::Z)] {
                if sid.ends_with(&format!("rotation{}", suffix)) || sid.ends_with(&format!("rotate{}", suffix)) {
                    return slot;
                }
            }
        }
        if axis == Vec3::X {
            RotationSlot::X
        } else if axis == Vec3::Y {
            RotationSlot::Y
        } else if axis == Vec3::Z {
            RotationSlot::Z
        } else {
            RotationSlot::Other
        }
    }
}

/// A single transform element of a node.
#[derive(Clone, Debug, PartialEq)]
enum TransformOp {
    /// `<matrix>`, row-major in the document
    Matrix(Mat4),

    /// `<translate>`
    Translate(Vec3),

    /// `<scale>`
    Scale(Vec3),

    /// `<rotate>`: axis and angle in degrees
    Rotate { axis: Vec3, degrees: f32, slot: RotationSlot },
}

impl TransformOp {
    fn rank(&self) -> u8 {
        match self {
            TransformOp::Matrix(_) => 0,
            TransformOp::Translate(_) => 1,
            TransformOp::Scale(_) => 2,
            TransformOp::Rotate { slot, .. } => match slot {
                RotationSlot::X => 3,
                RotationSlot::Y => 4,
                RotationSlot::Z => 5,
                RotationSlot::Other => 6,
            },
        }
    }

    fn apply(&self, matrix: Mat4) -> Mat4 {
        match self {
            TransformOp::Matrix(m) => matrix * *m,
            TransformOp::Translate(t) => matrix.translated(*t),
            TransformOp::Scale(s) => matrix.scaled(*s),
            TransformOp::Rotate { axis, degrees, .. } => matrix.rotated_degrees(*axis, *degrees),
        }
    }
}

/// Compose transform elements in slot order. The sort is stable, so ops
/// sharing a slot keep their document order.
fn compose_transform_ops(mut ops: Vec<TransformOp>) -> Mat4 {
    ops.sort_by_key(TransformOp::rank);
    ops.iter().fold(Mat4::IDENTITY, |matrix, op| op.apply(matrix))
}

fn parse_vec3(node: XmlNode<'_, '_>) -> ParseResult<Vec3> {
    let values: Vec<f32> = xml::parse_list_exact(node, 3)?;
    Ok(Vec3::from_slice(&values))
}

/// Parse a `<visual_scene>` into the graph.
pub fn parse_visual_scene(node: XmlNode<'_, '_>, graph: &mut SceneGraph) -> ParseResult<()> {
    xml::expect_tag(node, "visual_scene")?;
    let id = node.attribute("id").unwrap_or_default();

    let mut roots = Vec::new();
    for child in xml::element_children(node) {
        match xml::tag(child) {
            "node" => roots.push(parse_node(child, None, graph)?),
            other => log::debug!("visual scene '{}': skipping <{}>", id, other),
        }
    }

    log::debug!("visual scene '{}': {} top-level nodes", id, roots.len());
    graph.scenes.push(VisualScene {
        id: id.to_string(),
        name: node.attribute("name").unwrap_or(id).to_string(),
        roots,
    });
    Ok(())
}

fn parse_node(node: XmlNode<'_, '_>, parent: Option<NodeId>, graph: &mut SceneGraph) -> ParseResult<NodeId> {
    let kind = match node.attribute("type") {
        Some("JOINT") => NodeKind::Joint,
        Some("NODE") | None => NodeKind::Node,
        Some(other) => {
            return Err(ParseError::malformed(format!(
                "{} has unknown node type '{}'",
                xml::describe(node),
                other
            )))
        }
    };

    let mut ops = Vec::new();
    let mut instances = Vec::new();
    let mut child_nodes = Vec::new();

    for child in xml::element_children(node) {
        match xml::tag(child) {
            "matrix" => {
                let values: Vec<f32> = xml::parse_list_exact(child, 16)?;
                let matrix = Mat4::try_from_row_major_slice(&values)
                    .ok_or_else(|| ParseError::malformed("<matrix> needs 16 values"))?;
                ops.push(TransformOp::Matrix(matrix));
            }
            "translate" => ops.push(TransformOp::Translate(parse_vec3(child)?)),
            "scale" => ops.push(TransformOp::Scale(parse_vec3(child)?)),
            "rotate" => {
                let values: Vec<f32> = xml::parse_list_exact(child, 4)?;
                let axis = Vec3::new(values[0], values[1], values[2]);
                ops.push(TransformOp::Rotate {
                    axis,
                    degrees: values[3],
                    slot: RotationSlot::classify(child.attribute("sid"), axis),
                });
            }
            "instance_geometry" => instances.push(Instance::Geometry {
                url: xml::required_url(child, "url")?.to_string(),
                bind_material: parse_bind_material(child)?,
            }),
            "instance_controller" => instances.push(Instance::Controller {
                url: xml::required_url(child, "url")?.to_string(),
                skeleton: xml::child(child, "skeleton").map(|s| xml::strip_url(xml::text(s).trim()).to_string()),
                bind_material: parse_bind_material(child)?,
            }),
            "node" => child_nodes.push(child),
            other => log::debug!("{}: skipping <{}>", xml::describe(node), other),
        }
    }

    let id = graph.push(SceneNode {
        id: node.attribute("id").map(str::to_string),
        name: node.attribute("name").map(str::to_string),
        sid: node.attribute("sid").map(str::to_string),
        kind,
        transform: compose_transform_ops(ops),
        parent,
        children: Vec::new(),
        instances,
    });

    for child in child_nodes {
        let child_id = parse_node(child, Some(id), graph)?;
        graph.nodes[id.0].children.push(child_id);
    }

    Ok(id)
}

fn parse_bind_material(instance: XmlNode<'_, '_>) -> ParseResult<BindMaterial> {
    let mut bind = BindMaterial::default();
    let Some(technique) = xml::child(instance, "bind_material").and_then(|b| xml::child(b, "technique_common")) else {
        return Ok(bind);
    };

    for material in xml::element_children(technique).filter(|c| xml::tag(*c) == "instance_material") {
        bind.symbols.insert(
            xml::required_attribute(material, "symbol")?.to_string(),
            xml::required_url(material, "target")?.to_string(),
        );
    }
    Ok(bind)
}
