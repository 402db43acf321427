//! Packed, GPU-ready mesh representation.
//!
//! A [`Mesh`] is produced from a parsed [`MeshDef`] by [`Mesh::pack`]. Every
//! polylist is expanded into one interleaved `f32` vertex buffer and a `u16`
//! index buffer that the renderer can upload as-is. Skinned meshes carry
//! their joint/weight pairs inside the same vertex records.

use std::collections::BTreeMap;
use std::sync::Arc;

use dae_math::Mat4;

use crate::dae::{Joint, JointBuffer, MeshDef, ParseError, ParseResult, PolylistDef, Source, Vertices};
use crate::model::Material;

/// Largest number of vertices a `u16` index buffer can address.
pub const MAX_VERTICES: usize = u16::MAX as usize + 1;

/// What to do with faces that are not triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacePolicy {
    /// Fan-triangulate them and report the count on the packed polylist
    #[default]
    Triangulate,

    /// Fail with `UnsupportedFeature`
    RejectNonTriangles,
}

/// Per-vertex float layout of a packed polylist.
///
/// Attributes are interleaved in field order; absent attributes take no space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexLayout {
    /// Position components (usually 3)
    pub position: usize,

    /// Normal components
    pub normal: usize,

    /// Texture coordinate components
    pub texcoord: usize,

    /// Joint/weight floats, 2 per influence
    pub joint_slots: usize,
}

impl VertexLayout {
    pub fn elements_per_vertex(&self) -> usize {
        self.position + self.normal + self.texcoord + self.joint_slots
    }

    /// Byte stride of one vertex record.
    pub fn stride_bytes(&self) -> usize {
        self.elements_per_vertex() * std::mem::size_of::<f32>()
    }
}

/// A packed polylist.
#[derive(Clone, Debug)]
pub struct Polylist {
    /// Material symbol, resolved through [`Mesh::material`]
    pub material_symbol: Option<String>,

    pub layout: VertexLayout,

    /// Vertices per face, as declared
    pub vcount: Vec<usize>,

    /// Interleaved vertex records, one per face corner
    pub gpu_buffer: Vec<f32>,

    /// Triangle list indices into `gpu_buffer` records
    pub ibo_buffer: Vec<u16>,

    /// Faces with a vertex count other than 3
    pub non_triangle_faces: usize,
}

impl Polylist {
    pub fn face_count(&self) -> usize {
        self.vcount.len()
    }

    /// Number of packed vertex records.
    pub fn vertex_count(&self) -> usize {
        match self.layout.elements_per_vertex() {
            0 => 0,
            n => self.gpu_buffer.len() / n,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.ibo_buffer.len() / 3
    }

    /// The vertex buffer as bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.gpu_buffer)
    }

    /// The index buffer as bytes for upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.ibo_buffer)
    }
}

/// Skinning data attached to a mesh packed through a controller.
#[derive(Clone, Debug)]
pub struct MeshSkin {
    pub controller_id: String,

    /// Joints ordered by the index written into the vertex records
    pub joints: Vec<Joint>,
    pub bind_shape_matrix: Mat4,
    pub max_influences: usize,
}

/// A packed mesh with its bound materials.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Geometry id
    pub id: String,
    pub name: String,
    pub polylists: Vec<Polylist>,

    /// Material symbol → material, filled by the instances that use this mesh
    pub materials: BTreeMap<String, Arc<Material>>,
    pub skin: Option<MeshSkin>,
}

/// A vertex attribute resolved to its data and its slot in the index tuple.
struct Attribute<'a> {
    source: &'a Source,
    values: &'a [f32],
    offset: usize,
}

impl<'a> Attribute<'a> {
    fn new(source: &'a Source, offset: usize) -> ParseResult<Self> {
        Ok(Self {
            source,
            values: source.expect_floats()?,
            offset,
        })
    }

    fn stride(&self) -> usize {
        self.source.array.stride
    }

    fn append(&self, tuple: &[u32], out: &mut Vec<f32>) -> ParseResult<()> {
        let index = tuple[self.offset] as usize;
        let stride = self.stride();
        let element = self.values.get(index * stride..(index + 1) * stride).ok_or_else(|| {
            ParseError::malformed(format!(
                "index {} is out of range for source '{}' ({} elements)",
                index, self.source.id, self.source.array.count
            ))
        })?;
        out.extend_from_slice(element);
        Ok(())
    }
}

impl Mesh {
    /// Pack every polylist of a geometry.
    ///
    /// `joints` carries the skin and its joint buffer when the mesh is
    /// packed through a controller instance.
    pub fn pack(def: &MeshDef, joints: Option<(MeshSkin, &JointBuffer)>, policy: FacePolicy) -> ParseResult<Self> {
        let (skin, buffer) = match joints {
            Some((skin, buffer)) => (Some(skin), Some(buffer)),
            None => (None, None),
        };

        let polylists = def
            .polylists
            .iter()
            .map(|polylist| pack_polylist(def, polylist, buffer, policy))
            .collect::<ParseResult<Vec<_>>>()?;

        log::debug!(
            "packed mesh '{}': {} polylists, {} vertices{}",
            def.id,
            polylists.len(),
            polylists.iter().map(Polylist::vertex_count).sum::<usize>(),
            if skin.is_some() { " (skinned)" } else { "" }
        );

        Ok(Self {
            id: def.id.clone(),
            name: def.name.clone(),
            polylists,
            materials: BTreeMap::new(),
            skin,
        })
    }

    /// Bind a material symbol. Returns the previous binding, if any.
    pub fn bind_material(&mut self, symbol: impl Into<String>, material: Arc<Material>) -> Option<Arc<Material>> {
        self.materials.insert(symbol.into(), material)
    }

    pub fn material(&self, symbol: &str) -> Option<&Arc<Material>> {
        self.materials.get(symbol)
    }

    /// The material bound to a polylist's symbol.
    pub fn polylist_material(&self, polylist: &Polylist) -> Option<&Arc<Material>> {
        polylist.material_symbol.as_deref().and_then(|s| self.material(s))
    }

    pub fn is_skinned(&self) -> bool {
        self.skin.is_some()
    }

    pub fn vertex_count(&self) -> usize {
        self.polylists.iter().map(Polylist::vertex_count).sum()
    }
}

fn pack_polylist(
    def: &MeshDef,
    polylist: &PolylistDef,
    joints: Option<&JointBuffer>,
    policy: FacePolicy,
) -> ParseResult<Polylist> {
    let vertex_input = polylist
        .input("VERTEX")
        .ok_or_else(|| ParseError::malformed(format!("geometry '{}' has a polylist without VERTEX input", def.id)))?;
    let vertices = def.vertices(&vertex_input.source)?;

    let position_id = vertices.inputs.get("POSITION").ok_or_else(|| {
        ParseError::malformed(format!("vertices '{}' has no POSITION input", vertices.id))
    })?;
    let position = Attribute::new(def.source(position_id)?, vertex_input.offset)?;

    let normal = optional_attribute(def, polylist, vertices, vertex_input.offset, "NORMAL")?;
    let texcoord = optional_attribute(def, polylist, vertices, vertex_input.offset, "TEXCOORD")?;

    let layout = VertexLayout {
        position: position.stride(),
        normal: normal.as_ref().map_or(0, Attribute::stride),
        texcoord: texcoord.as_ref().map_or(0, Attribute::stride),
        joint_slots: joints.map_or(0, JointBuffer::record_len),
    };

    let vertex_count = polylist.vertex_count();
    if vertex_count > MAX_VERTICES {
        return Err(ParseError::unsupported(format!(
            "geometry '{}': polylist has {} vertices, more than a u16 index buffer can address",
            def.id, vertex_count
        )));
    }

    let tuple_width = polylist.num_semantics();
    let mut gpu_buffer = Vec::with_capacity(vertex_count * layout.elements_per_vertex());
    for tuple in polylist.indices.chunks_exact(tuple_width) {
        position.append(tuple, &mut gpu_buffer)?;
        if let Some(normal) = &normal {
            normal.append(tuple, &mut gpu_buffer)?;
        }
        if let Some(texcoord) = &texcoord {
            texcoord.append(tuple, &mut gpu_buffer)?;
        }
        if let Some(joints) = joints {
            let vertex = tuple[position.offset] as usize;
            let record = joints.record(vertex).ok_or_else(|| {
                ParseError::malformed(format!(
                    "geometry '{}': vertex {} has no joint weights ({} weighted vertices)",
                    def.id,
                    vertex,
                    joints.vertex_count()
                ))
            })?;
            gpu_buffer.extend_from_slice(record);
        }
    }

    let (ibo_buffer, non_triangle_faces) = triangulate(&polylist.vcount);
    if non_triangle_faces > 0 {
        if policy == FacePolicy::RejectNonTriangles {
            return Err(ParseError::unsupported(format!(
                "geometry '{}': {} faces are not triangles",
                def.id, non_triangle_faces
            )));
        }
        log::warn!(
            "geometry '{}': {} of {} faces are not triangles and were fan-triangulated",
            def.id,
            non_triangle_faces,
            polylist.face_count()
        );
    }

    Ok(Polylist {
        material_symbol: polylist.material_symbol.clone(),
        layout,
        vcount: polylist.vcount.clone(),
        gpu_buffer,
        ibo_buffer,
        non_triangle_faces,
    })
}

/// Resolve an attribute from the polylist inputs, falling back to the
/// `<vertices>` inputs, which are indexed by the VERTEX index.
fn optional_attribute<'a>(
    def: &'a MeshDef,
    polylist: &'a PolylistDef,
    vertices: &'a Vertices,
    vertex_offset: usize,
    semantic: &str,
) -> ParseResult<Option<Attribute<'a>>> {
    if let Some(input) = polylist.input(semantic) {
        return Attribute::new(def.source(&input.source)?, input.offset).map(Some);
    }
    match vertices.inputs.get(semantic) {
        Some(id) => Attribute::new(def.source(id)?, vertex_offset).map(Some),
        None => Ok(None),
    }
}

/// Fan-triangulate faces laid out one after another.
///
/// Returns the triangle list and the number of faces that were not
/// triangles. Faces with fewer than 3 vertices produce no indices.
fn triangulate(vcount: &[usize]) -> (Vec<u16>, usize) {
    let mut indices = Vec::new();
    let mut non_triangles = 0;
    let mut base = 0usize;

    for &count in vcount {
        if count != 3 {
            non_triangles += 1;
        }
        for i in 1..count.saturating_sub(1) {
            indices.push(base as u16);
            indices.push((base + i) as u16);
            indices.push((base + i + 1) as u16);
        }
        base += count;
    }

    (indices, non_triangles)
}
