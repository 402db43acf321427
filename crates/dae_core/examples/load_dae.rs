//! Example: Load and inspect a COLLADA file.
//!
//! Run with: cargo run --example load_dae -- crates/dae_core/tests/assets/skinned_quad.dae

use std::env;

use dae_core::dae::load_dae;
use dae_core::math::Vec3;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: load_dae <path-to-dae-file>");
        println!("\nExample:");
        println!("  cargo run --example load_dae -- crates/dae_core/tests/assets/skinned_quad.dae");
        return;
    }

    let path = &args[1];
    println!("Loading COLLADA file: {}", path);

    match load_dae(path) {
        Ok(model) => {
            println!("\n=== Model: {} (COLLADA {}) ===", model.name, model.version);
            println!("Meshes: {}", model.mesh_count());
            println!("Bones: {}", model.skeleton.len());
            println!("Animations: {}", model.animations.len());
            println!("Total vertices: {}", model.vertex_count());

            println!("\n--- Meshes ---");
            for mesh in model.sorted_meshes() {
                println!(
                    "  {} ({}) - {} polylists, {} vertices{}",
                    mesh.id,
                    mesh.name,
                    mesh.polylists.len(),
                    mesh.vertex_count(),
                    if mesh.is_skinned() { ", skinned" } else { "" }
                );
                for polylist in &mesh.polylists {
                    let material = mesh
                        .polylist_material(polylist)
                        .map(|m| m.name.as_str())
                        .unwrap_or("<unbound>");
                    println!(
                        "       {} triangles, {} floats per vertex, material {}",
                        polylist.triangle_count(),
                        polylist.layout.elements_per_vertex(),
                        material
                    );
                    if polylist.non_triangle_faces > 0 {
                        println!("       {} faces were triangulated", polylist.non_triangle_faces);
                    }
                }
            }

            println!("\n--- Nodes ---");
            for (id, node) in model.scene.iter() {
                let pos = model.scene.world_transform(id).transform_point3(Vec3::ZERO);
                println!(
                    "  {} at ({:.2}, {:.2}, {:.2})",
                    node.identifier(),
                    pos.x,
                    pos.y,
                    pos.z
                );
            }
        }
        Err(e) => {
            eprintln!("Error loading COLLADA file: {}", e);
        }
    }
}
