//! Indented diagnostic dumps of a loaded model.
//!
//! ```ignore
//! use dae_core::dump::{Dump, DumpTree};
//!
//! let mut dump = Dump::new(std::io::stdout().lock());
//! model.dump_into(&mut dump)?;
//! ```

use std::fmt;
use std::io::{self, Write};

use crate::dae::{Animation, ColorSource, Effect, NodeId, SceneGraph};
use crate::mesh::{Mesh, MeshSkin, Polylist};
use crate::model::{Material, ModelData};
use crate::skeleton::Skeleton;

const INDENT: &str = "  ";

/// Indentation-aware line writer.
pub struct Dump<W: Write> {
    out: W,
    depth: usize,
}

impl<W: Write> Dump<W> {
    pub fn new(out: W) -> Self {
        Self { out, depth: 0 }
    }

    /// Write one line at the current depth.
    pub fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        for _ in 0..self.depth {
            self.out.write_all(INDENT.as_bytes())?;
        }
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")
    }

    /// Run `body` one level deeper.
    pub fn nested(&mut self, body: impl FnOnce(&mut Self) -> io::Result<()>) -> io::Result<()> {
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Types that can describe themselves into a [`Dump`].
pub trait DumpTree {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()>;

    /// Render the dump into a string.
    fn dump_string(&self) -> io::Result<String> {
        let mut dump = Dump::new(Vec::new());
        self.dump_into(&mut dump)?;
        Ok(String::from_utf8_lossy(&dump.into_inner()).into_owned())
    }
}

impl DumpTree for ModelData {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!("Model[name:'{}', version:'{}']", self.name, self.version))?;
        dump.nested(|dump| {
            for mesh in self.sorted_meshes() {
                mesh.dump_into(dump)?;
            }
            self.skeleton.dump_into(dump)?;
            self.scene.dump_into(dump)?;

            let mut animations: Vec<&Animation> = self.animations.values().collect();
            animations.sort_by(|a, b| a.id.cmp(&b.id));
            for animation in animations {
                animation.dump_into(dump)?;
            }
            Ok(())
        })
    }
}

impl DumpTree for Mesh {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!(
            "Mesh[id:'{}', name:'{}', polylists:{}]",
            self.id,
            self.name,
            self.polylists.len()
        ))?;
        dump.nested(|dump| {
            if let Some(skin) = &self.skin {
                skin.dump_into(dump)?;
            }
            for polylist in &self.polylists {
                polylist.dump_into(dump)?;
            }
            for (symbol, material) in &self.materials {
                dump.line(format_args!("bind '{}' ->", symbol))?;
                dump.nested(|dump| material.dump_into(dump))?;
            }
            Ok(())
        })
    }
}

impl DumpTree for MeshSkin {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!(
            "Skin[controller:'{}', joints:{}, max_influences:{}]",
            self.controller_id,
            self.joints.len(),
            self.max_influences
        ))?;
        dump.nested(|dump| {
            for joint in &self.joints {
                dump.line(format_args!("Joint[index:{}, name:'{}']", joint.index, joint.name))?;
            }
            Ok(())
        })
    }
}

impl DumpTree for Polylist {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!(
            "Polylist[material:{:?}, faces:{}, vertices:{}, elements_per_vertex:{}, indices:{}, non_triangles:{}]",
            self.material_symbol,
            self.face_count(),
            self.vertex_count(),
            self.layout.elements_per_vertex(),
            self.ibo_buffer.len(),
            self.non_triangle_faces
        ))
    }
}

impl DumpTree for Material {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!("Material[id:'{}', name:'{}']", self.id, self.name))?;
        dump.nested(|dump| self.effect.dump_into(dump))
    }
}

struct ColorDisplay<'a>(&'a Option<ColorSource>);

impl fmt::Display for ColorDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("-"),
            Some(ColorSource::Color(c)) => write!(f, "({:.3}, {:.3}, {:.3}, {:.3})", c.x, c.y, c.z, c.w),
            Some(ColorSource::Texture { texture, .. }) => write!(f, "texture '{}'", texture),
        }
    }
}

impl DumpTree for Effect {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        let phong = self.phong();
        dump.line(format_args!("Effect[id:'{}']", self.id))?;
        dump.nested(|dump| {
            dump.line(format_args!(
                "Phong[emission:{}, ambient:{}, diffuse:{}, specular:{}, shininess:{:?}]",
                ColorDisplay(&phong.emission),
                ColorDisplay(&phong.ambient),
                ColorDisplay(&phong.diffuse),
                ColorDisplay(&phong.specular),
                phong.shininess
            ))
        })
    }
}

impl DumpTree for Skeleton {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        fn bone<W: Write>(skeleton: &Skeleton, index: usize, dump: &mut Dump<W>) -> io::Result<()> {
            let entry = &skeleton.bones[index];
            dump.line(format_args!("Bone[id:'{}']", entry.id))?;
            dump.nested(|dump| {
                for &child in &entry.children {
                    bone(skeleton, child, dump)?;
                }
                Ok(())
            })
        }

        dump.line(format_args!("Skeleton[bones:{}]", self.len()))?;
        dump.nested(|dump| {
            for &root in &self.roots {
                bone(self, root, dump)?;
            }
            Ok(())
        })
    }
}

impl DumpTree for SceneGraph {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        fn node<W: Write>(graph: &SceneGraph, id: NodeId, dump: &mut Dump<W>) -> io::Result<()> {
            let scene_node = graph.node(id);
            dump.line(format_args!(
                "Node[id:'{}', kind:{:?}, instances:{}]",
                scene_node.identifier(),
                scene_node.kind,
                scene_node.instances.len()
            ))?;
            dump.nested(|dump| {
                for instance in &scene_node.instances {
                    dump.line(format_args!("instance '{}'", instance.reference_url()))?;
                }
                for &child in &scene_node.children {
                    node(graph, child, dump)?;
                }
                Ok(())
            })
        }

        for scene in &self.scenes {
            dump.line(format_args!("VisualScene[id:'{}', nodes:{}]", scene.id, scene.roots.len()))?;
            dump.nested(|dump| {
                for &root in &scene.roots {
                    node(self, root, dump)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

impl DumpTree for Animation {
    fn dump_into<W: Write>(&self, dump: &mut Dump<W>) -> io::Result<()> {
        dump.line(format_args!(
            "Animation[id:'{}', target:{:?}, sources:{}, samplers:{}]",
            self.id,
            self.channel_target,
            self.sources.len(),
            self.sampler.len()
        ))
    }
}
