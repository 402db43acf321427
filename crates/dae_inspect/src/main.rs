// Inspect COLLADA models: prints the resolved model tree or a JSON summary.
// Run with: cargo run --release --bin dae_inspect -- [--json] [--strict] <file.dae>...

use std::env;
use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use dae_core::{Dump, DumpTree, LoadOptions, ModelCache};

fn main() -> Result<()> {
    env_logger::init();

    let mut json = false;
    let mut strict = false;
    let mut paths = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "--strict" => strict = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            _ => paths.push(arg),
        }
    }
    if paths.is_empty() {
        eprintln!("Usage: dae_inspect [--json] [--strict] <file.dae>...");
        std::process::exit(1);
    }

    let options = if strict { LoadOptions::strict() } else { LoadOptions::default() };
    let mut cache = ModelCache::with_options(options);
    let results = cache.load_many(&paths);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut summaries = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        let model = result.with_context(|| format!("failed to load {}", path))?;
        log::info!("{}: {} meshes, {} vertices", path, model.mesh_count(), model.vertex_count());

        if json {
            summaries.push(model.summary());
        } else {
            model.dump_into(&mut Dump::new(&mut out))?;
        }
    }

    if json {
        serde_json::to_writer_pretty(&mut out, &summaries)?;
        writeln!(out)?;
    }
    Ok(())
}
