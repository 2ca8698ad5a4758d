#![allow(dead_code)]

use anyhow::{Context, Result, bail};
use capgen::find_repo_root;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn repo_root() -> PathBuf {
    find_repo_root().expect("tests require repository root")
}

/// Path of a binary built for this test run.
pub fn helper_binary(name: &str) -> PathBuf {
    let path = match name {
        "capgen-resolve" => env!("CARGO_BIN_EXE_capgen-resolve"),
        "capgen-classify" => env!("CARGO_BIN_EXE_capgen-classify"),
        "capgen-detect" => env!("CARGO_BIN_EXE_capgen-detect"),
        "capgen-matrix" => env!("CARGO_BIN_EXE_capgen-matrix"),
        other => panic!("unknown helper {other}"),
    };
    PathBuf::from(path)
}

/// Command for a helper with the catalog pinned to this checkout and no
/// ambient seeds or path overrides leaking in from the caller's environment.
pub fn helper_command(name: &str) -> Command {
    let mut cmd = Command::new(helper_binary(name));
    cmd.env("CAPGEN_ROOT", repo_root());
    for var in ["CAPGEN_REGISTRY", "CAPGEN_RULES", "CAPGEN_TARGETS"] {
        cmd.env_remove(var);
    }
    for (key, _) in std::env::vars() {
        if key.starts_with("CAPGEN_SEED_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

pub fn run_command(mut cmd: Command) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run command: {:?}", cmd))?;
    if output.status.success() {
        Ok(output)
    } else {
        bail!(
            "command {:?} failed: status {:?}\nstdout: {}\nstderr: {}",
            cmd,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    }
}

/// Run a command that is expected to exit non-zero and return its output.
pub fn run_failing(mut cmd: Command) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run command: {:?}", cmd))?;
    if output.status.success() {
        bail!(
            "command {:?} unexpectedly succeeded\nstdout: {}",
            cmd,
            String::from_utf8_lossy(&output.stdout)
        );
    }
    Ok(output)
}

pub fn fixture(name: &str) -> Result<String> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).with_context(|| format!("reading fixture {}", path.display()))
}
