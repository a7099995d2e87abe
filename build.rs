use anyhow::{Context, Result};
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    // Generate git information
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    // Add build timestamp
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc
            .timestamp_opt(val.parse::<i64>()?, 0)
            .single()
            .context("SOURCE_DATE_EPOCH is out of range")?,
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    // Get mediaprobe library version using cargo metadata
    let library_version = get_library_version_from_metadata().unwrap_or_else(|_| {
        read_library_version_fallback().unwrap_or_else(|_| "unknown".to_string())
    });
    println!("cargo:rustc-env=MEDIAPROBE_VERSION={library_version}");

    // Tell cargo to rerun this build script if the library Cargo.toml changes
    println!("cargo:rerun-if-changed=mediaprobe/Cargo.toml");

    Ok(())
}

/// Get the mediaprobe version using cargo metadata (works with published and local dependencies)
fn get_library_version_from_metadata() -> Result<String> {
    let output = Command::new("cargo")
        .args(["metadata", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    // Workspace members first (local development)
    let member = metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"].as_str() == Some("mediaprobe"))
        .and_then(|package| package["version"].as_str());
    if let Some(version) = member {
        return Ok(version.to_string());
    }

    // Dependency graph for the published package, ids look like
    // "mediaprobe 0.3.0 (registry+...)"
    let resolved = metadata["resolve"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|node| node["id"].as_str())
        .find_map(|id| {
            let rest = id.strip_prefix("mediaprobe ")?;
            rest.split(' ').next()
        });
    if let Some(version) = resolved {
        return Ok(version.to_string());
    }

    anyhow::bail!("mediaprobe package not found in metadata");
}

/// Fallback: manually parse mediaprobe/Cargo.toml
fn read_library_version_fallback() -> Result<String> {
    let toml_content = fs::read_to_string("mediaprobe/Cargo.toml")?;

    for line in toml_content.lines() {
        let line = line.trim();
        if line.starts_with("version") {
            if let Some((_, value)) = line.split_once('=') {
                return Ok(value.trim().trim_matches('"').trim_matches('\'').to_string());
            }
        }
    }

    anyhow::bail!("Could not find version in mediaprobe/Cargo.toml");
}
