//! Build script for clusterkit-resources
//!
//! Embeds every manifest template under `templates/resources/` into the
//! binary. The resource name is the kebab-cased file stem; files ending in
//! `.new` or `.not-ready` are skipped, and two files that map to the same
//! resource name fail the build.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const EXCLUDED_SUFFIXES: &[&str] = &[".new", ".not-ready"];

fn resource_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace('_', "-").to_lowercase())
}

fn main() {
    let manifest_dir =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR should be set"));
    let templates_dir = manifest_dir.join("templates").join("resources");
    println!("cargo:rerun-if-changed={}", templates_dir.display());

    let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
    let dir = std::fs::read_dir(&templates_dir)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", templates_dir.display(), e));
    for entry in dir {
        let path = entry.expect("read template directory entry").path();
        if !path.is_file() {
            continue;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if EXCLUDED_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
            continue;
        }
        println!("cargo:rerun-if-changed={}", path.display());

        let name = resource_name(&path)
            .unwrap_or_else(|| panic!("could not derive a resource name from {}", path.display()));
        if let Some(existing) = entries.insert(name.clone(), path.clone()) {
            panic!(
                "{} and {} both map to resource {:?}; rename or exclude one of them",
                existing.display(),
                path.display(),
                name
            );
        }
    }

    let mut code = String::from("/// Templates embedded at build time, sorted by name\n");
    code.push_str("pub(crate) static EMBEDDED_TEMPLATES: &[(&str, &str)] = &[\n");
    for (name, path) in &entries {
        writeln!(code, "    ({:?}, include_str!({:?})),", name, path.display().to_string())
            .expect("write to String");
    }
    code.push_str("];\n");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR should be set"));
    std::fs::write(out_dir.join("embedded_templates.rs"), code).expect("write embedded_templates.rs");
}
