//! `<library_geometries>` parsing.
//!
//! Each `<geometry>` becomes a [`MeshDef`]: its sources, the `<vertices>`
//! indirection tables, and one [`PolylistDef`] per `<polylist>` or
//! `<triangles>` primitive. Buffers are not generated here; see
//! [`crate::mesh::Mesh::pack`].

use std::collections::HashMap;

use super::error::{ParseError, ParseResult, RefKind};
use super::source::{parse_source, Source};
use super::xml::{self, XmlNode};

/// An `<input>` of a primitive or of `<vertex_weights>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    /// Semantic name (VERTEX, NORMAL, TEXCOORD, JOINT, WEIGHT, ...)
    pub semantic: String,

    /// Referenced id, `#` stripped
    pub source: String,

    /// Position of this input's index inside one vertex tuple
    pub offset: usize,

    /// Attribute set (e.g. the UV channel of a TEXCOORD input)
    pub set: Option<u32>,
}

/// Parse the `<input>` children of an element.
///
/// Inputs without an `offset` attribute take their declaration position,
/// which is how unshared inputs are laid out.
pub(crate) fn parse_inputs(node: XmlNode<'_, '_>) -> ParseResult<Vec<Input>> {
    let mut inputs = Vec::new();
    for (position, child) in xml::element_children(node)
        .filter(|c| xml::tag(*c) == "input")
        .enumerate()
    {
        inputs.push(Input {
            semantic: xml::required_attribute(child, "semantic")?.to_string(),
            source: xml::required_url(child, "source")?.to_string(),
            offset: xml::parse_attribute(child, "offset")?.unwrap_or(position),
            set: xml::parse_attribute(child, "set")?,
        });
    }
    Ok(inputs)
}

/// Width of one vertex tuple in an index stream.
pub(crate) fn tuple_width(inputs: &[Input]) -> usize {
    inputs.iter().map(|i| i.offset.saturating_add(1)).max().unwrap_or(0)
}

/// Sum of a `vcount` list, failing on overflow.
pub(crate) fn vertex_total(node: XmlNode<'_, '_>, vcount: &[usize]) -> ParseResult<usize> {
    vcount
        .iter()
        .try_fold(0usize, |total, &n| total.checked_add(n))
        .ok_or_else(|| ParseError::malformed(format!("{} vertex count overflows", xml::describe(node))))
}

/// Number of indices `vertex_total` tuples of `inputs` occupy.
pub(crate) fn index_count(node: XmlNode<'_, '_>, vertex_total: usize, inputs: &[Input]) -> ParseResult<usize> {
    let width = tuple_width(inputs);
    if width == 0 && vertex_total > 0 {
        return Err(ParseError::malformed(format!(
            "{} indexes {} vertices but declares no inputs",
            xml::describe(node),
            vertex_total
        )));
    }
    vertex_total
        .checked_mul(width)
        .ok_or_else(|| ParseError::malformed(format!("{} index count overflows", xml::describe(node))))
}

/// A `<vertices>` element: semantic → source id.
#[derive(Clone, Debug, Default)]
pub struct Vertices {
    pub id: String,
    pub inputs: HashMap<String, String>,
}

/// An unpacked face list.
#[derive(Clone, Debug)]
pub struct PolylistDef {
    /// Symbol bound to a material through `<bind_material>`
    pub material_symbol: Option<String>,

    /// Declared inputs
    pub inputs: Vec<Input>,

    /// Vertices per face
    pub vcount: Vec<usize>,

    /// One index per semantic per vertex per face
    pub indices: Vec<u32>,
}

impl PolylistDef {
    pub fn face_count(&self) -> usize {
        self.vcount.len()
    }

    /// Sum of `vcount`: the number of vertices the packer emits.
    pub fn vertex_count(&self) -> usize {
        self.vcount.iter().sum()
    }

    /// Number of index slots per vertex.
    pub fn num_semantics(&self) -> usize {
        tuple_width(&self.inputs)
    }

    /// The input for a semantic; for multi-set semantics the lowest set wins.
    pub fn input(&self, semantic: &str) -> Option<&Input> {
        self.inputs
            .iter()
            .filter(|i| i.semantic == semantic)
            .min_by_key(|i| i.set.unwrap_or(0))
    }
}

/// An unpacked `<geometry>/<mesh>`.
#[derive(Clone, Debug, Default)]
pub struct MeshDef {
    pub id: String,
    pub name: String,
    pub sources: HashMap<String, Source>,
    pub vertices: HashMap<String, Vertices>,
    pub polylists: Vec<PolylistDef>,
}

impl MeshDef {
    pub fn source(&self, id: &str) -> ParseResult<&Source> {
        self.sources
            .get(id)
            .ok_or_else(|| ParseError::unresolved(RefKind::Source, id))
    }

    pub fn vertices(&self, id: &str) -> ParseResult<&Vertices> {
        self.vertices
            .get(id)
            .ok_or_else(|| ParseError::unresolved(RefKind::Vertices, id))
    }

    /// Check that every source id referenced from vertices and primitives exists.
    fn validate_references(&self) -> ParseResult<()> {
        for vertices in self.vertices.values() {
            for source in vertices.inputs.values() {
                self.source(source)?;
            }
        }
        for polylist in &self.polylists {
            for input in &polylist.inputs {
                if input.semantic == "VERTEX" {
                    self.vertices(&input.source)?;
                } else {
                    self.source(&input.source)?;
                }
            }
        }
        Ok(())
    }
}

/// Parse a `<geometry>` element.
pub fn parse_geometry(node: XmlNode<'_, '_>) -> ParseResult<MeshDef> {
    xml::expect_tag(node, "geometry")?;
    let id = xml::required_attribute(node, "id")?;
    let name = node.attribute("name").unwrap_or(id);

    let mut mesh = None;
    for child in xml::element_children(node) {
        match xml::tag(child) {
            "mesh" => {
                if mesh.is_some() {
                    return Err(ParseError::unsupported(format!(
                        "geometry '{}' has more than one <mesh>",
                        id
                    )));
                }
                mesh = Some(parse_mesh(id, name, child)?);
            }
            "asset" | "extra" => {}
            other => {
                return Err(ParseError::unsupported(format!(
                    "geometry '{}': <{}> is not supported",
                    id, other
                )));
            }
        }
    }

    mesh.ok_or_else(|| ParseError::malformed(format!("geometry '{}' has no <mesh>", id)))
}

fn parse_mesh(id: &str, name: &str, node: XmlNode<'_, '_>) -> ParseResult<MeshDef> {
    let mut mesh = MeshDef {
        id: id.to_string(),
        name: name.to_string(),
        ..Default::default()
    };

    for child in xml::element_children(node) {
        match xml::tag(child) {
            "source" => {
                let source = parse_source(child)?;
                if mesh.sources.contains_key(&source.id) {
                    return Err(ParseError::malformed(format!(
                        "geometry '{}' declares source '{}' twice",
                        id, source.id
                    )));
                }
                mesh.sources.insert(source.id.clone(), source);
            }
            "vertices" => {
                let vertices = parse_vertices(child)?;
                mesh.vertices.insert(vertices.id.clone(), vertices);
            }
            "polylist" => mesh.polylists.push(parse_polylist(child)?),
            "triangles" => mesh.polylists.push(parse_triangles(child)?),
            "extra" => {}
            other @ ("polygons" | "lines" | "linestrips" | "trifans" | "tristrips") => {
                return Err(ParseError::unsupported(format!(
                    "geometry '{}': <{}> primitives are not supported",
                    id, other
                )));
            }
            other => {
                log::debug!("geometry '{}': skipping <{}>", id, other);
            }
        }
    }

    mesh.validate_references()?;

    log::debug!(
        "geometry '{}': {} sources, {} primitive lists",
        id,
        mesh.sources.len(),
        mesh.polylists.len()
    );

    Ok(mesh)
}

fn parse_vertices(node: XmlNode<'_, '_>) -> ParseResult<Vertices> {
    xml::expect_tag(node, "vertices")?;
    let inputs = parse_inputs(node)?
        .into_iter()
        .map(|input| (input.semantic, input.source))
        .collect();

    Ok(Vertices {
        id: xml::required_attribute(node, "id")?.to_string(),
        inputs,
    })
}

/// Parse a `<polylist>`.
pub(crate) fn parse_polylist(node: XmlNode<'_, '_>) -> ParseResult<PolylistDef> {
    xml::expect_tag(node, "polylist")?;
    let count: usize = xml::required_parsed_attribute(node, "count")?;
    let inputs = parse_inputs(node)?;

    let vcount: Vec<usize> = match xml::child(node, "vcount") {
        Some(vcount) => xml::parse_list_exact(vcount, count)?,
        None if count == 0 => Vec::new(),
        None => return Err(ParseError::malformed("<polylist> is missing <vcount>")),
    };

    let indices = primitive_indices(node, &inputs, vertex_total(node, &vcount)?)?;
    Ok(PolylistDef {
        material_symbol: node.attribute("material").map(str::to_string),
        inputs,
        vcount,
        indices,
    })
}

/// Parse a `<triangles>` list as a polylist whose faces all have 3 vertices.
pub(crate) fn parse_triangles(node: XmlNode<'_, '_>) -> ParseResult<PolylistDef> {
    xml::expect_tag(node, "triangles")?;
    let count: usize = xml::required_parsed_attribute(node, "count")?;
    let inputs = parse_inputs(node)?;

    let total = count
        .checked_mul(3)
        .ok_or_else(|| ParseError::malformed(format!("{} vertex count overflows", xml::describe(node))))?;
    // <p> must back `count` before vcount is allocated
    let indices = primitive_indices(node, &inputs, total)?;
    Ok(PolylistDef {
        material_symbol: node.attribute("material").map(str::to_string),
        inputs,
        vcount: vec![3; count],
        indices,
    })
}

fn primitive_indices(node: XmlNode<'_, '_>, inputs: &[Input], vertex_total: usize) -> ParseResult<Vec<u32>> {
    let expected = index_count(node, vertex_total, inputs)?;
    match xml::child(node, "p") {
        Some(p) => xml::parse_list_exact(p, expected),
        None if expected == 0 => Ok(Vec::new()),
        None => Err(ParseError::malformed(format!(
            "<{}> is missing <p>",
            xml::tag(node)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_GEOMETRY: &str = r##"
<geometry id="Plane-mesh" name="Plane">
  <mesh>
    <source id="Plane-positions">
      <float_array count="12">-1 -1 0 1 -1 0 1 1 0 -1 1 0</float_array>
      <technique_common><accessor count="4" stride="3"/></technique_common>
    </source>
    <source id="Plane-normals">
      <float_array count="3">0 0 1</float_array>
      <technique_common><accessor count="1" stride="3"/></technique_common>
    </source>
    <vertices id="Plane-vertices">
      <input semantic="POSITION" source="#Plane-positions"/>
    </vertices>
    <polylist material="Material-material" count="2">
      <input semantic="VERTEX" source="#Plane-vertices" offset="0"/>
      <input semantic="NORMAL" source="#Plane-normals" offset="1"/>
      <vcount>3 3</vcount>
      <p>0 0 1 0 2 0 0 0 2 0 3 0</p>
    </polylist>
  </mesh>
</geometry>"##;

    fn parse(text: &str) -> ParseResult<MeshDef> {
        let doc = roxmltree::Document::parse(text).unwrap();
        parse_geometry(doc.root_element())
    }

    #[test]
    fn test_parse_geometry() {
        let mesh = parse(QUAD_GEOMETRY).unwrap();

        assert_eq!(mesh.id, "Plane-mesh");
        assert_eq!(mesh.name, "Plane");
        assert_eq!(mesh.sources.len(), 2);
        assert_eq!(mesh.vertices["Plane-vertices"].inputs["POSITION"], "Plane-positions");

        let polylist = &mesh.polylists[0];
        assert_eq!(polylist.material_symbol.as_deref(), Some("Material-material"));
        assert_eq!(polylist.vcount, vec![3, 3]);
        assert_eq!(polylist.num_semantics(), 2);
        assert_eq!(
            polylist.indices.len(),
            polylist.vertex_count() * polylist.num_semantics()
        );
    }

    #[test]
    fn test_index_count_mismatch_is_malformed() {
        let text = QUAD_GEOMETRY.replace("<p>0 0 1 0 2 0 0 0 2 0 3 0</p>", "<p>0 0 1 0 2 0 0 0 2 0 3</p>");
        assert!(matches!(parse(&text), Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_vcount_overflow_is_malformed() {
        let text = QUAD_GEOMETRY
            .replace("<vcount>", "<vcount>18446744073709551615 ")
            .replace("material=\"Material-material\" count=\"2\"", "material=\"Material-material\" count=\"3\"");
        assert!(matches!(parse(&text), Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_triangle_count_overflow_is_malformed() {
        let text = r##"<geometry id="Tri-mesh"><mesh>
            <source id="Tri-positions">
              <float_array count="9">0 0 0 1 0 0 0 1 0</float_array>
              <technique_common><accessor count="3" stride="3"/></technique_common>
            </source>
            <vertices id="Tri-vertices"><input semantic="POSITION" source="#Tri-positions"/></vertices>
            <triangles count="9223372036854775807">
              <input semantic="VERTEX" source="#Tri-vertices" offset="0"/>
              <p>0 1 2</p>
            </triangles>
        </mesh></geometry>"##;
        assert!(matches!(parse(text), Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_dangling_source_is_unresolved() {
        let text = QUAD_GEOMETRY.replace("#Plane-normals\" offset", "#Missing-normals\" offset");
        assert!(matches!(
            parse(&text),
            Err(ParseError::UnresolvedReference { kind: RefKind::Source, .. })
        ));
    }

    #[test]
    fn test_convex_mesh_is_unsupported() {
        let text = r##"<geometry id="hull"><convex_mesh convex_hull_of="#Plane-mesh"/></geometry>"##;
        assert!(matches!(parse(text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_polygons_are_unsupported() {
        let text = r#"<geometry id="g"><mesh><polygons count="0"/></mesh></geometry>"#;
        assert!(matches!(parse(text), Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_triangles_get_implicit_vcount() {
        let text = QUAD_GEOMETRY
            .replace("<polylist material=\"Material-material\" count=\"2\">", "<triangles count=\"2\">")
            .replace("<vcount>3 3</vcount>", "")
            .replace("</polylist>", "</triangles>");
        let mesh = parse(&text).unwrap();

        assert_eq!(mesh.polylists[0].vcount, vec![3, 3]);
        assert!(mesh.polylists[0].material_symbol.is_none());
    }

    #[test]
    fn test_inputs_without_offset_use_declaration_order() {
        let doc = roxmltree::Document::parse(
            r##"<polylist count="1">
                <input semantic="VERTEX" source="#v"/>
                <input semantic="NORMAL" source="#n"/>
                <input semantic="TEXCOORD" source="#t" set="1"/>
                <vcount>3</vcount>
                <p>0 0 0 1 1 1 2 2 2</p>
            </polylist>"##,
        )
        .unwrap();
        let polylist = parse_polylist(doc.root_element()).unwrap();

        assert_eq!(polylist.input("NORMAL").unwrap().offset, 1);
        assert_eq!(polylist.input("TEXCOORD").unwrap().set, Some(1));
        assert_eq!(polylist.num_semantics(), 3);
    }
}
