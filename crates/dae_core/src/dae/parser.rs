//! Document resolution pipeline.
//!
//! A document moves through a fixed sequence of stages:
//!
//! ```text
//! Unparsed -> LibrariesLoaded -> MaterialsLinked -> SceneResolved -> Ready
//! ```
//!
//! Libraries are read in any order and only stored by id. Cross references
//! are resolved afterwards: material → effect when linking materials, and
//! instance → geometry/controller/material when resolving the scene. Any
//! error moves the document to `ParseFailed` and no model is produced.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::animation::{parse_animation, Animation};
use super::effect::{parse_effect, parse_material, Effect, MaterialDef};
use super::error::{ParseError, ParseResult, RefKind};
use super::geometry::{parse_geometry, MeshDef};
use super::loader::LoadOptions;
use super::skin::{parse_controller, ControllerDef};
use super::visual_scene::{parse_visual_scene, BindMaterial, Instance, SceneGraph};
use super::xml::{self, XmlNode};
use crate::mesh::{Mesh, MeshSkin};
use crate::model::{Material, ModelData};
use crate::skeleton::Skeleton;

/// Progress of a document through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DocumentStage {
    Unparsed,
    LibrariesLoaded,
    MaterialsLinked,
    SceneResolved,
    Ready,
    ParseFailed,
}

impl fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Registries of one document, threaded through every stage.
pub(crate) struct DocumentContext<'o> {
    name: String,
    version: String,
    options: &'o LoadOptions,
    stage: DocumentStage,

    geometries: HashMap<String, MeshDef>,
    controllers: HashMap<String, ControllerDef>,
    effects: HashMap<String, Arc<Effect>>,
    material_defs: HashMap<String, MaterialDef>,
    materials: HashMap<String, Arc<Material>>,
    animations: HashMap<String, Animation>,
    scene: SceneGraph,

    /// Packed meshes keyed by geometry id
    meshes: HashMap<String, Mesh>,
}

fn insert_unique<T>(map: &mut HashMap<String, T>, kind: &str, id: String, value: T) -> ParseResult<()> {
    if map.contains_key(&id) {
        return Err(ParseError::malformed(format!("{} '{}' declared twice", kind, id)));
    }
    map.insert(id, value);
    Ok(())
}

impl<'o> DocumentContext<'o> {
    pub(crate) fn new(name: &str, version: &str, options: &'o LoadOptions) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            options,
            stage: DocumentStage::Unparsed,
            geometries: HashMap::new(),
            controllers: HashMap::new(),
            effects: HashMap::new(),
            material_defs: HashMap::new(),
            materials: HashMap::new(),
            animations: HashMap::new(),
            scene: SceneGraph::default(),
            meshes: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn stage(&self) -> DocumentStage {
        self.stage
    }

    fn advance(&mut self, next: DocumentStage) {
        log::debug!("document '{}': {} -> {}", self.name, self.stage, next);
        self.stage = next;
    }

    /// Run every stage. On failure the context is left in `ParseFailed`.
    pub(crate) fn run(&mut self, root: XmlNode<'_, '_>) -> ParseResult<ModelData> {
        let result = self
            .load_libraries(root)
            .and_then(|_| self.link_materials())
            .and_then(|_| self.resolve_scene())
            .and_then(|_| self.finish());

        if let Err(err) = &result {
            log::debug!("document '{}' failed at {}: {}", self.name, self.stage, err);
            self.stage = DocumentStage::ParseFailed;
        }
        result
    }

    fn load_libraries(&mut self, root: XmlNode<'_, '_>) -> ParseResult<()> {
        for section in xml::element_children(root) {
            match xml::tag(section) {
                "library_geometries" => {
                    for node in library_items(section, "geometry") {
                        let geometry = parse_geometry(node)?;
                        insert_unique(&mut self.geometries, "geometry", geometry.id.clone(), geometry)?;
                    }
                }
                "library_controllers" => {
                    for node in library_items(section, "controller") {
                        let controller = parse_controller(node)?;
                        insert_unique(&mut self.controllers, "controller", controller.id.clone(), controller)?;
                    }
                }
                "library_effects" => {
                    for node in library_items(section, "effect") {
                        let effect = parse_effect(node)?;
                        insert_unique(&mut self.effects, "effect", effect.id.clone(), Arc::new(effect))?;
                    }
                }
                "library_materials" => {
                    for node in library_items(section, "material") {
                        let material = parse_material(node)?;
                        insert_unique(&mut self.material_defs, "material", material.id.clone(), material)?;
                    }
                }
                "library_animations" => {
                    for node in library_items(section, "animation") {
                        parse_animation(node, &mut self.animations)?;
                    }
                }
                "library_visual_scenes" => {
                    for node in library_items(section, "visual_scene") {
                        parse_visual_scene(node, &mut self.scene)?;
                    }
                }
                "asset" | "library_cameras" | "library_lights" | "library_images" | "scene" | "extra" => {
                    log::debug!("document '{}': skipping <{}>", self.name, xml::tag(section));
                }
                other => log::warn!("document '{}': unknown section <{}> skipped", self.name, other),
            }
        }

        log::debug!(
            "document '{}': {} geometries, {} controllers, {} effects, {} materials, {} animations, {} nodes",
            self.name,
            self.geometries.len(),
            self.controllers.len(),
            self.effects.len(),
            self.material_defs.len(),
            self.animations.len(),
            self.scene.len()
        );
        self.advance(DocumentStage::LibrariesLoaded);
        Ok(())
    }

    fn link_materials(&mut self) -> ParseResult<()> {
        for (id, def) in &self.material_defs {
            let effect = self
                .effects
                .get(&def.effect_url)
                .ok_or_else(|| ParseError::unresolved(RefKind::Effect, def.effect_url.as_str()))?;
            let material = Material {
                id: def.id.clone(),
                name: def.name.clone(),
                effect: Arc::clone(effect),
            };
            self.materials.insert(id.clone(), Arc::new(material));
        }

        self.advance(DocumentStage::MaterialsLinked);
        Ok(())
    }

    /// Instance resolution: pack every instanced mesh once and bind its materials.
    fn resolve_scene(&mut self) -> ParseResult<()> {
        let instances: Vec<Instance> = self
            .scene
            .iter()
            .flat_map(|(_, node)| node.instances.iter().cloned())
            .collect();

        for instance in &instances {
            let geometry_id = match instance {
                Instance::Geometry { url, .. } => self.resolve_geometry(url)?,
                Instance::Controller { url, skeleton, .. } => {
                    if let Some(skeleton) = skeleton {
                        if self.scene.find(skeleton).is_none() {
                            log::warn!("controller instance '{}': skeleton '{}' not in scene", url, skeleton);
                        }
                    }
                    self.resolve_controller(url)?
                }
            };
            self.bind_materials(&geometry_id, instance.bind_material())?;
        }

        self.advance(DocumentStage::SceneResolved);
        Ok(())
    }

    fn resolve_geometry(&mut self, url: &str) -> ParseResult<String> {
        let def = self
            .geometries
            .get(url)
            .ok_or_else(|| ParseError::unresolved(RefKind::Geometry, url))?;

        if let Some(mesh) = self.meshes.get(url) {
            if mesh.is_skinned() {
                log::warn!("geometry '{}' already packed with joints, keeping that layout", url);
            }
            return Ok(url.to_string());
        }

        let mesh = Mesh::pack(def, None, self.options.face_policy)?;
        self.meshes.insert(url.to_string(), mesh);
        Ok(url.to_string())
    }

    fn resolve_controller(&mut self, url: &str) -> ParseResult<String> {
        let controller = self
            .controllers
            .get(url)
            .ok_or_else(|| ParseError::unresolved(RefKind::Controller, url))?;
        let skin = &controller.skin;
        let target = skin.source_id.clone();
        let def = self
            .geometries
            .get(&target)
            .ok_or_else(|| ParseError::unresolved(RefKind::Geometry, target.as_str()))?;

        if let Some(mesh) = self.meshes.get(&target) {
            let same_skin = mesh.skin.as_ref().map(|s| s.controller_id.as_str()) == Some(url);
            if !same_skin {
                log::warn!(
                    "geometry '{}' already packed, controller '{}' cannot repack it",
                    target,
                    url
                );
            }
            return Ok(target);
        }

        let buffer = skin.generate_joint_buffer()?;
        let mesh_skin = MeshSkin {
            controller_id: controller.id.clone(),
            joints: skin.ordered_joints().into_iter().cloned().collect(),
            bind_shape_matrix: skin.bind_shape_matrix,
            max_influences: buffer.max_influences,
        };
        let mesh = Mesh::pack(def, Some((mesh_skin, &buffer)), self.options.face_policy)?;
        self.meshes.insert(target.clone(), mesh);
        Ok(target)
    }

    fn bind_materials(&mut self, geometry_id: &str, bind: &BindMaterial) -> ParseResult<()> {
        for (symbol, target) in &bind.symbols {
            let material = self
                .materials
                .get(target)
                .ok_or_else(|| ParseError::unresolved(RefKind::Material, target.as_str()))?;
            let Some(mesh) = self.meshes.get_mut(geometry_id) else {
                continue;
            };
            if let Some(previous) = mesh.bind_material(symbol.as_str(), Arc::clone(material)) {
                if previous.id != *target {
                    log::warn!(
                        "mesh '{}': symbol '{}' rebound from '{}' to '{}'",
                        geometry_id,
                        symbol,
                        previous.id,
                        target
                    );
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ParseResult<ModelData> {
        for (id, def) in &self.geometries {
            if !self.meshes.contains_key(id) {
                log::debug!("geometry '{}' is not instanced, packing without joints", id);
                let mesh = Mesh::pack(def, None, self.options.face_policy)?;
                self.meshes.insert(id.clone(), mesh);
            }
        }

        let scene = std::mem::take(&mut self.scene);
        let skeleton = Skeleton::extract(&scene);
        for mesh in self.meshes.values() {
            for joint in mesh.skin.iter().flat_map(|s| &s.joints) {
                if skeleton.find_joint(&joint.name).is_none() {
                    log::warn!("mesh '{}': joint '{}' has no bone in the scene", mesh.id, joint.name);
                }
            }
        }

        self.advance(DocumentStage::Ready);
        log::info!(
            "Loaded '{}': {} meshes, {} bones, {} animations",
            self.name,
            self.meshes.len(),
            skeleton.len(),
            self.animations.len()
        );

        Ok(ModelData {
            name: self.name.clone(),
            version: self.version.clone(),
            meshes: std::mem::take(&mut self.meshes),
            skeleton,
            animations: std::mem::take(&mut self.animations),
            scene,
        })
    }
}

/// Items of a library section, skipping `asset`/`extra` and anything unexpected.
fn library_items<'a, 'input>(
    section: XmlNode<'a, 'input>,
    item: &'static str,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    xml::element_children(section).filter(move |child| match xml::tag(*child) {
        tag if tag == item => true,
        "asset" | "extra" => false,
        other => {
            log::warn!("<{}>: unexpected <{}> skipped", xml::tag(section), other);
            false
        }
    })
}

/// Check the root element and version, then run the pipeline.
pub fn parse_document(root: XmlNode<'_, '_>, name: &str, options: &LoadOptions) -> ParseResult<ModelData> {
    if xml::tag(root) != "COLLADA" {
        return Err(ParseError::malformed(format!(
            "root element is <{}>, expected <COLLADA>",
            xml::tag(root)
        )));
    }
    let version = xml::required_attribute(root, "version")?;
    if !options.supported_versions.iter().any(|v| v == version) {
        return Err(ParseError::VersionUnsupported(version.to_string()));
    }

    DocumentContext::new(name, version, options).run(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dae::ErrorKind;

    const DOCUMENT: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Z_UP</up_axis></asset>
  <library_effects>
    <effect id="Red-effect"><profile_COMMON><technique sid="common"><phong>
      <diffuse><color sid="diffuse">1 0 0 1</color></diffuse>
    </phong></technique></profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="Red-material" name="Red"><instance_effect url="#Red-effect"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="Tri-mesh" name="Tri">
      <mesh>
        <source id="Tri-positions">
          <float_array count="9">0 0 0 1 0 0 0 1 0</float_array>
          <technique_common><accessor count="3" stride="3"/></technique_common>
        </source>
        <vertices id="Tri-vertices"><input semantic="POSITION" source="#Tri-positions"/></vertices>
        <triangles material="Red-material" count="1">
          <input semantic="VERTEX" source="#Tri-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="Tri">
        <instance_geometry url="#Tri-mesh">
          <bind_material><technique_common>
            <instance_material symbol="Red-material" target="#Red-material"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##;

    fn run(text: &str) -> (DocumentStage, ParseResult<ModelData>) {
        let doc = roxmltree::Document::parse(text).unwrap();
        let options = LoadOptions::default();
        let mut context = DocumentContext::new("test", "1.4.1", &options);
        let result = context.run(doc.root_element());
        (context.stage(), result)
    }

    #[test]
    fn test_document_reaches_ready() {
        let (stage, result) = run(DOCUMENT);
        let model = result.unwrap();

        assert_eq!(stage, DocumentStage::Ready);
        let mesh = model.mesh("Tri-mesh").unwrap();
        assert_eq!(mesh.polylists[0].ibo_buffer, vec![0, 1, 2]);
        let material = mesh.polylist_material(&mesh.polylists[0]).unwrap();
        assert_eq!(material.name, "Red");
        assert_eq!(material.diffuse_color().unwrap().x, 1.0);
    }

    #[test]
    fn test_unresolved_instance_fails_document() {
        let (stage, result) = run(&DOCUMENT.replace("url=\"#Tri-mesh\"", "url=\"#Nope-mesh\""));

        assert_eq!(stage, DocumentStage::ParseFailed);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnresolvedReference);
    }

    #[test]
    fn test_dangling_bind_material_target() {
        let (_, result) = run(&DOCUMENT.replace("target=\"#Red-material\"", "target=\"#Blue-material\""));

        assert!(matches!(
            result,
            Err(ParseError::UnresolvedReference { kind: RefKind::Material, .. })
        ));
    }

    #[test]
    fn test_dangling_effect_fails_at_linking() {
        let (_, result) = run(&DOCUMENT.replace("url=\"#Red-effect\"", "url=\"#Blue-effect\""));

        assert!(matches!(
            result,
            Err(ParseError::UnresolvedReference { kind: RefKind::Effect, .. })
        ));
    }

    #[test]
    fn test_duplicate_geometry_id_is_malformed() {
        let geometry_start = DOCUMENT.find("<geometry ").unwrap();
        let geometry_end = DOCUMENT.find("</geometry>").unwrap() + "</geometry>".len();
        let geometry = &DOCUMENT[geometry_start..geometry_end];
        let text = DOCUMENT.replace("</library_geometries>", &format!("{}</library_geometries>", geometry));

        let (_, result) = run(&text);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MalformedDocument);
    }

    #[test]
    fn test_version_gate() {
        let options = LoadOptions::default();
        let text = DOCUMENT.replace("version=\"1.4.1\"", "version=\"1.5.0\"");
        let doc = roxmltree::Document::parse(&text).unwrap();

        let result = parse_document(doc.root_element(), "test", &options);
        assert!(matches!(result, Err(ParseError::VersionUnsupported(v)) if v == "1.5.0"));

        let options = options.with_supported_versions(["1.4.1", "1.5.0"]);
        assert!(parse_document(doc.root_element(), "test", &options).is_ok());
    }

    #[test]
    fn test_unknown_section_is_skipped() {
        let text = DOCUMENT.replace("<scene>", "<library_physics_models/><scene>");
        let (stage, result) = run(&text);

        assert!(result.is_ok());
        assert_eq!(stage, DocumentStage::Ready);
    }

    #[test]
    fn test_missing_skeleton_node_only_warns() {
        let controllers = r##"<library_controllers>
    <controller id="Tri-skin"><skin source="#Tri-mesh">
      <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
      <source id="Tri-joints">
        <Name_array count="1">Bone</Name_array>
        <technique_common><accessor count="1"/></technique_common>
      </source>
      <source id="Tri-bind-poses">
        <float_array count="16">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</float_array>
        <technique_common><accessor count="1" stride="16"/></technique_common>
      </source>
      <source id="Tri-weights">
        <float_array count="1">1</float_array>
        <technique_common><accessor count="1"/></technique_common>
      </source>
      <joints>
        <input semantic="JOINT" source="#Tri-joints"/>
        <input semantic="INV_BIND_MATRIX" source="#Tri-bind-poses"/>
      </joints>
      <vertex_weights count="3">
        <input semantic="JOINT" source="#Tri-joints" offset="0"/>
        <input semantic="WEIGHT" source="#Tri-weights" offset="1"/>
        <vcount>1 1 1</vcount>
        <v>0 0 0 0 0 0</v>
      </vertex_weights>
    </skin></controller>
  </library_controllers>
  <library_visual_scenes>"##;
        let text = DOCUMENT
            .replace("<library_visual_scenes>", controllers)
            .replace(
                "<instance_geometry url=\"#Tri-mesh\">",
                "<instance_controller url=\"#Tri-skin\"><skeleton>#Armature</skeleton>",
            )
            .replace("</instance_geometry>", "</instance_controller>")
            .replace("<node id=\"Tri\">", "<node id=\"Bone\" sid=\"Bone\"/><node id=\"Tri\">");

        let (stage, result) = run(&text);
        let model = result.unwrap();

        assert_eq!(stage, DocumentStage::Ready);
        assert!(model.scene.find("Armature").is_none());
        let mesh = model.mesh("Tri-mesh").unwrap();
        assert!(mesh.is_skinned());
        assert_eq!(mesh.polylists[0].layout.elements_per_vertex(), 5);
        assert_eq!(mesh.material("Red-material").unwrap().name, "Red");
    }

    #[test]
    fn test_uninstanced_geometry_is_packed() {
        let start = DOCUMENT.find("<instance_geometry").unwrap();
        let end = DOCUMENT.find("</instance_geometry>").unwrap() + "</instance_geometry>".len();
        let text = format!("{}{}", &DOCUMENT[..start], &DOCUMENT[end..]);

        let model = run(&text).1.unwrap();
        let mesh = model.mesh("Tri-mesh").unwrap();
        assert!(!mesh.is_skinned());
        assert!(mesh.materials.is_empty());
        assert_eq!(mesh.vertex_count(), 3);
    }
}
