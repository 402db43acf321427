//! Bone hierarchy extracted from the scene graph.
//!
//! Bones are a projection of scene nodes that is independent of the scene
//! graph: a bone only knows its id, its local transform and its children.

use std::collections::HashMap;

use dae_math::Mat4;

use crate::dae::{NodeId, SceneGraph};

/// A bone: one scene node of an armature subtree.
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    /// Node identifier (id, falling back to sid or name)
    pub id: String,

    pub name: Option<String>,

    /// Scope id; skins usually name joints by sid
    pub sid: Option<String>,

    /// Local transform
    pub transform: Mat4,

    /// Indices into [`Skeleton::bones`]
    pub children: Vec<usize>,
}

/// Every bone extracted from a scene, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    pub roots: Vec<usize>,
    by_id: HashMap<String, usize>,
}

impl Skeleton {
    /// Extract bones from every top-level node that has children.
    ///
    /// Each armature subtree is walked breadth-first twice: the first pass
    /// creates the bones, the second links children by id. All armatures
    /// share one id map, so an id seen twice replaces the earlier bone.
    pub fn extract(graph: &SceneGraph) -> Self {
        let mut skeleton = Skeleton::default();
        let armatures: Vec<NodeId> = graph.roots().filter(|&r| !graph.node(r).children.is_empty()).collect();

        let mut visited = Vec::new();
        for &root in &armatures {
            for id in graph.breadth_first(root) {
                skeleton.insert(graph, id);
                visited.push(id);
            }
        }

        for id in visited {
            let node = graph.node(id);
            let children: Vec<usize> = node
                .children
                .iter()
                .filter_map(|&child| skeleton.by_id.get(graph.node(child).identifier()).copied())
                .collect();
            if let Some(&index) = skeleton.by_id.get(node.identifier()) {
                skeleton.bones[index].children = children;
            }
        }

        for root in armatures {
            if let Some(&index) = skeleton.by_id.get(graph.node(root).identifier()) {
                if !skeleton.roots.contains(&index) {
                    skeleton.roots.push(index);
                }
            }
        }

        log::debug!(
            "extracted {} bones from {} armatures",
            skeleton.bones.len(),
            skeleton.roots.len()
        );
        skeleton
    }

    fn insert(&mut self, graph: &SceneGraph, id: NodeId) {
        let node = graph.node(id);
        let bone = Bone {
            id: node.identifier().to_string(),
            name: node.name.clone(),
            sid: node.sid.clone(),
            transform: node.transform,
            children: Vec::new(),
        };

        match self.by_id.get(&bone.id) {
            Some(&index) => {
                log::warn!("bone '{}' appears in more than one armature, replacing it", bone.id);
                self.bones[index] = bone;
            }
            None => {
                self.by_id.insert(bone.id.clone(), self.bones.len());
                self.bones.push(bone);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, id: &str) -> Option<&Bone> {
        self.by_id.get(id).map(|&index| &self.bones[index])
    }

    /// Ids of a bone's children, in document order.
    pub fn child_ids(&self, id: &str) -> Vec<&str> {
        self.bone(id)
            .map(|bone| bone.children.iter().map(|&c| self.bones[c].id.as_str()).collect())
            .unwrap_or_default()
    }

    /// The bone a skin joint name refers to: matched by sid first, then id.
    pub fn find_joint(&self, name: &str) -> Option<&Bone> {
        self.bones
            .iter()
            .find(|bone| bone.sid.as_deref() == Some(name))
            .or_else(|| self.bone(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dae::parse_visual_scene;

    fn graph(text: &str) -> SceneGraph {
        let doc = roxmltree::Document::parse(text).unwrap();
        let mut graph = SceneGraph::default();
        parse_visual_scene(doc.root_element(), &mut graph).unwrap();
        graph
    }

    #[test]
    fn test_extract_tree() {
        let graph = graph(
            r#"<visual_scene id="Scene">
                <node id="A">
                  <node id="B" sid="Bone_B"><node id="D"/></node>
                  <node id="C"/>
                </node>
                <node id="Lonely"/>
              </visual_scene>"#,
        );
        let skeleton = Skeleton::extract(&graph);

        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.child_ids("A"), vec!["B", "C"]);
        assert_eq!(skeleton.child_ids("B"), vec!["D"]);
        assert!(skeleton.child_ids("D").is_empty());
        assert!(skeleton.bone("Lonely").is_none());
        assert_eq!(skeleton.roots.len(), 1);
        assert_eq!(skeleton.find_joint("Bone_B").unwrap().id, "B");
        assert_eq!(skeleton.find_joint("C").unwrap().id, "C");
    }

    #[test]
    fn test_shared_id_overwrites() {
        let graph = graph(
            r#"<visual_scene id="Scene">
                <node id="Rig1"><node id="Shared"><node id="Leaf1"/></node></node>
                <node id="Rig2"><node id="Shared"><translate>1 0 0</translate></node></node>
              </visual_scene>"#,
        );
        let skeleton = Skeleton::extract(&graph);

        // Rig1, Shared, Leaf1, Rig2
        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.roots.len(), 2);
        let shared = skeleton.bone("Shared").unwrap();
        assert!((shared.transform.w_axis.x - 1.0).abs() < 0.001);
        assert!(skeleton.child_ids("Shared").is_empty());
        assert_eq!(skeleton.child_ids("Rig1"), vec!["Shared"]);
    }
}
