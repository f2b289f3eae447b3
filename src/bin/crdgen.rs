// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `ControlPlaneNode` CRD from the Rust types in src/crd.rs so
//! that deploy/crds/ never drifts from the code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! `ModuleConfig` is owned by the platform and is not generated here.

use kube::CustomResourceExt;
use std::fs;
use std::path::Path;
use sysreg::crd::ControlPlaneNode;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2026 sysreg contributors
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");

    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<ControlPlaneNode>("controlplanenodes.crd.yaml", output_dir)?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let yaml = serde_yaml::to_string(&T::crd())?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");

    let output_path = output_dir.join(filename);
    fs::write(&output_path, content)?;

    println!("  ✓ Generated {filename}");

    Ok(())
}
