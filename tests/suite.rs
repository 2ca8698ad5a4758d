#![cfg(unix)]

mod support;

use anyhow::{Context, Result};
use capgen::{
    ArchitectureClassifier, CapabilityRegistry, FlagName, FlagValue, HeaderEmitter, Resolver,
    RuleSet, SeedMap, TargetDescriptor, load_targets,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use support::{fixture, helper_command, repo_root, run_command, run_failing};
use tempfile::TempDir;

const QNX_AARCH64_TRIPLE: &str = "aarch64-unknown-nto-qnx710";
const GOLDEN_HEADER: &str = "aarch64-qnx-qnx710.h";

fn shipped_catalog() -> Result<(CapabilityRegistry, RuleSet)> {
    let root = repo_root();
    let registry = CapabilityRegistry::load(&root.join("catalog/registry.json"))?;
    let rules = RuleSet::load(&root.join("catalog/rules.json"))?;
    Ok((registry, rules))
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn shipped_catalog_is_lint_clean_and_resolves_every_target() -> Result<()> {
    let (registry, rules) = shipped_catalog()?;
    let lint = rules.lint(&registry);
    assert!(lint.is_empty(), "catalog lint problems: {lint:?}");

    let classifier = ArchitectureClassifier::standard();
    let specs = load_targets(&repo_root().join("catalog/targets.json"))?;
    let descriptors = specs
        .iter()
        .map(|spec| spec.descriptor(&classifier))
        .collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<String> = specs
        .iter()
        .zip(&descriptors)
        .map(|(spec, descriptor)| spec.label(descriptor))
        .collect();
    assert_eq!(
        labels,
        [
            "x86-qnx-qnx710",
            "amd64-qnx-qnx710",
            "armv7-qnx-qnx710",
            "aarch64-qnx-qnx710",
            "aarch64-linux-gnu",
        ]
    );

    let resolver = Resolver::new(&registry, &rules, &classifier);
    for (label, result) in labels.iter().zip(resolver.resolve_all(&descriptors)) {
        let table = result.with_context(|| format!("resolving {label}"))?;
        let arch_flags = table
            .entries()
            .iter()
            .filter(|entry| entry.name.as_str().starts_with("ARCHITECTURE_IS_"))
            .count();
        assert_eq!(arch_flags, 1, "{label}");
    }
    Ok(())
}

#[test]
fn qnx_aarch64_header_matches_golden_file() -> Result<()> {
    let (registry, rules) = shipped_catalog()?;
    let classifier = ArchitectureClassifier::standard();
    let target = TargetDescriptor::from_triple(&classifier, QNX_AARCH64_TRIPLE)?;
    let table = Resolver::new(&registry, &rules, &classifier).resolve(&target)?;

    for removed in ["HAVE_MADVISE", "HAVE_MINCORE"] {
        let entry = table.get(removed).context("removed flag stays addressed")?;
        assert!(!entry.is_defined(), "{removed}");
        assert!(entry.replaced.is_some(), "{removed}");
    }
    assert_eq!(table.value("PAGE_SIZE"), Some(&FlagValue::Int(4096)));
    assert_eq!(table.value("ARCHITECTURE_IS_AARCH64"), Some(&FlagValue::Bool(true)));

    let rendered = HeaderEmitter::new(&registry, &classifier).render(&table);
    for removed in ["HAVE_MADVISE", "HAVE_MINCORE"] {
        assert!(rendered.contains(&format!("\n// #define {removed} 0\n")), "{removed}");
        assert!(!rendered.contains(&format!("\n#define {removed}")), "{removed}");
    }
    assert!(rendered.contains(
        "// We're depending on the POSIX implementation instead:\n// #define HAVE_MADVISE 0\n"
    ));
    assert!(rendered.contains("\n#define SETLOCALE_NULL_NOT_SUPPORTED 1\n\n#define DO_NOT_CALCULATE_DST_FOR_GMT_AND_UTC 1\n"));
    assert_eq!(rendered, fixture(GOLDEN_HEADER)?);
    Ok(())
}

#[test]
fn qnx_targets_differ_only_in_architecture_flags() -> Result<()> {
    let (registry, rules) = shipped_catalog()?;
    let classifier = ArchitectureClassifier::standard();
    let resolver = Resolver::new(&registry, &rules, &classifier);
    let arm64 = resolver.resolve(&TargetDescriptor::from_triple(&classifier, QNX_AARCH64_TRIPLE)?)?;
    let x86 = resolver.resolve(&TargetDescriptor::from_triple(&classifier, "i686-pc-nto-qnx710")?)?;

    let defined = |table: &capgen::CapabilityTable| -> BTreeSet<(String, String)> {
        table
            .entries()
            .iter()
            .filter_map(|entry| {
                let value = entry.value.as_ref()?;
                Some((entry.name.as_str().to_string(), value.to_string()))
            })
            .collect()
    };
    let (arm64, x86) = (defined(&arm64), defined(&x86));
    let differing: Vec<&str> = arm64
        .symmetric_difference(&x86)
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(differing, ["ARCHITECTURE_IS_AARCH64", "ARCHITECTURE_IS_X86"]);
    Ok(())
}

#[test]
fn seeded_page_size_replaces_guarded_default() -> Result<()> {
    let (registry, rules) = shipped_catalog()?;
    let classifier = ArchitectureClassifier::standard();
    let target = TargetDescriptor::from_triple(&classifier, QNX_AARCH64_TRIPLE)?;
    let mut seeds = SeedMap::new();
    seeds.insert(FlagName::from("PAGE_SIZE"), FlagValue::Int(0x4000));
    let table = Resolver::new(&registry, &rules, &classifier)
        .with_seeds(&seeds)
        .resolve(&target)?;

    let page_size = table.get("PAGE_SIZE").context("PAGE_SIZE resolved")?;
    assert_eq!(page_size.value, Some(FlagValue::Int(0x4000)));
    assert!(page_size.guarded);
    Ok(())
}

#[test]
fn resolve_cli_prints_golden_header() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--triple", QNX_AARCH64_TRIPLE]);
    let output = run_command(cmd)?;
    assert_eq!(stdout_of(&output), fixture(GOLDEN_HEADER)?);
    Ok(())
}

#[test]
fn resolve_cli_applies_seed_arguments() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--triple", QNX_AARCH64_TRIPLE, "--seed", "PAGE_SIZE=0x4000"]);
    let output = run_command(cmd)?;
    let header = stdout_of(&output);
    assert!(
        header.contains("#ifndef PAGE_SIZE\n#define PAGE_SIZE 0x4000\n#endif\n"),
        "unexpected header:\n{header}"
    );
    Ok(())
}

#[test]
fn resolve_cli_seed_argument_beats_environment() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.env("CAPGEN_SEED_PAGE_SIZE", "8192");
    cmd.args(["--triple", QNX_AARCH64_TRIPLE, "--seed", "PAGE_SIZE=16384"]);
    let header = stdout_of(&run_command(cmd)?);
    assert!(header.contains("#define PAGE_SIZE 0x4000\n"), "{header}");

    let mut cmd = helper_command("capgen-resolve");
    cmd.env("CAPGEN_SEED_PAGE_SIZE", "8192");
    cmd.args(["--triple", QNX_AARCH64_TRIPLE]);
    let header = stdout_of(&run_command(cmd)?);
    assert!(header.contains("#define PAGE_SIZE 0x2000\n"), "{header}");
    Ok(())
}

#[test]
fn resolve_cli_emits_json_table() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.args([
        "--tokens",
        "__arm__,__QNX__",
        "--os",
        "qnx",
        "--variant",
        "qnx710",
        "--format",
        "json",
    ]);
    let output = run_command(cmd)?;
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["registry"], "il2cpp_mono_config_v1");
    assert_eq!(value["target"]["arch"], "armv7");

    let entries = value["entries"].as_array().context("entries array")?;
    let arch = entries
        .iter()
        .find(|entry| entry["name"] == "ARCHITECTURE_IS_ARMv7")
        .context("ARMv7 flag present")?;
    assert_eq!(arch["value"], true);
    assert_eq!(arch["site"]["kind"], "architecture");
    Ok(())
}

#[test]
fn resolve_cli_rejects_unknown_architecture() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--tokens", "__sparc__", "--os", "qnx"]);
    let output = run_failing(cmd)?;
    assert!(output.stdout.is_empty());
    assert!(
        stderr_of(&output).contains("unsupported architecture"),
        "stderr: {}",
        stderr_of(&output)
    );
    Ok(())
}

#[test]
fn resolve_cli_names_both_conflicting_rules() -> Result<()> {
    let dir = TempDir::new()?;
    let rules_path = dir.path().join("rules.json");
    fs::write(
        &rules_path,
        r#"{
  "schema_version": "capgen_rules_v1",
  "rules": [
    { "id": "threads-on", "set": { "HAVE_FORK": true } },
    { "id": "threads-off", "when": { "os": ["qnx"] }, "set": { "HAVE_FORK": false } }
  ]
}"#,
    )?;

    let mut cmd = helper_command("capgen-resolve");
    cmd.arg("--rules").arg(&rules_path);
    cmd.args(["--triple", QNX_AARCH64_TRIPLE]);
    let output = run_failing(cmd)?;
    let stderr = stderr_of(&output);
    assert!(stderr.contains("conflicting assignment for HAVE_FORK"), "{stderr}");
    assert!(stderr.contains("threads-on"), "{stderr}");
    assert!(stderr.contains("threads-off"), "{stderr}");
    Ok(())
}

#[test]
fn resolve_cli_rejects_rules_that_rewrite_architecture_flags() -> Result<()> {
    let dir = TempDir::new()?;
    let rules_path = dir.path().join("rules.json");
    fs::write(
        &rules_path,
        r#"{
  "schema_version": "capgen_rules_v1",
  "rules": [
    {
      "id": "soft-float",
      "when": { "arch": ["armv7"] },
      "mode": "override",
      "set": { "ARM_FPU_VFP": null, "HAVE_ARMV6": false }
    }
  ]
}"#,
    )?;

    let mut cmd = helper_command("capgen-resolve");
    cmd.arg("--rules").arg(&rules_path);
    cmd.args(["--tokens", "__arm__", "--os", "qnx"]);
    let output = run_failing(cmd)?;
    let stderr = stderr_of(&output);
    assert!(stderr.contains("rule #0 (soft-float) may not change ARM_FPU_VFP"), "{stderr}");
    assert!(output.stdout.is_empty());
    Ok(())
}

#[test]
fn resolve_cli_accepts_mingw_triple() -> Result<()> {
    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--triple", "x86_64-w64-mingw32", "--format", "json"]);
    let output = run_command(cmd)?;
    let table: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(table["target"]["arch"], "amd64");
    assert_eq!(table["target"]["os"], "windows");
    Ok(())
}

#[test]
fn resolve_cli_leaves_output_untouched_on_failure() -> Result<()> {
    let dir = TempDir::new()?;
    let out = dir.path().join("config.h");
    fs::write(&out, "previous\n")?;

    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--tokens", "__sparc__", "--os", "qnx", "--output"]);
    cmd.arg(&out);
    run_failing(cmd)?;
    assert_eq!(fs::read_to_string(&out)?, "previous\n");

    let mut cmd = helper_command("capgen-resolve");
    cmd.args(["--triple", QNX_AARCH64_TRIPLE, "--output"]);
    cmd.arg(&out);
    let output = run_command(cmd)?;
    assert!(output.stdout.is_empty());
    assert_eq!(fs::read_to_string(&out)?, fixture(GOLDEN_HEADER)?);
    Ok(())
}

#[test]
fn classify_cli_reports_family_and_rejects_unknown_tokens() -> Result<()> {
    let mut cmd = helper_command("capgen-classify");
    cmd.args(["__arm__", "__QNX__"]);
    let output = run_command(cmd)?;
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["family"], "armv7");
    assert_eq!(value["indicator"], "__arm__");

    let mut cmd = helper_command("capgen-classify");
    cmd.arg("__mips__");
    let output = run_failing(cmd)?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("unsupported architecture"));
    Ok(())
}

#[test]
fn matrix_cli_writes_one_header_per_target() -> Result<()> {
    let dir = TempDir::new()?;
    let mut cmd = helper_command("capgen-matrix");
    cmd.arg("--out-dir").arg(dir.path());
    run_command(cmd)?;

    let mut written: Vec<String> = fs::read_dir(dir.path())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    written.sort();
    assert_eq!(
        written,
        [
            "aarch64-linux-gnu.h",
            "aarch64-qnx-qnx710.h",
            "amd64-qnx-qnx710.h",
            "armv7-qnx-qnx710.h",
            "x86-qnx-qnx710.h",
        ]
    );
    assert_eq!(
        fs::read_to_string(dir.path().join(GOLDEN_HEADER))?,
        fixture(GOLDEN_HEADER)?
    );
    Ok(())
}

#[test]
fn matrix_cli_prints_ndjson_in_target_order() -> Result<()> {
    let output = run_command(helper_command("capgen-matrix"))?;
    let stdout = stdout_of(&output);
    let arches: Vec<String> = stdout
        .lines()
        .map(|line| -> Result<String> {
            let value: Value = serde_json::from_str(line)?;
            Ok(value["target"]["arch"].as_str().unwrap_or_default().to_string())
        })
        .collect::<Result<_>>()?;
    assert_eq!(arches, ["x86", "amd64", "armv7", "aarch64", "aarch64"]);
    Ok(())
}

#[test]
fn matrix_cli_reports_every_failing_target() -> Result<()> {
    let dir = TempDir::new()?;
    let targets = dir.path().join("targets.json");
    fs::write(
        &targets,
        r#"{
  "schema_version": "capgen_targets_v1",
  "targets": [
    { "triple": "riscv64gc-unknown-linux-gnu" },
    { "triple": "aarch64-unknown-nto-qnx710" },
    { "tokens": ["__powerpc__"], "os": "linux" }
  ]
}"#,
    )?;

    let mut cmd = helper_command("capgen-matrix");
    cmd.arg("--targets").arg(&targets);
    let output = run_failing(cmd)?;
    let stderr = stderr_of(&output);
    assert!(stderr.contains("target #0"), "{stderr}");
    assert!(stderr.contains("target #2"), "{stderr}");
    assert!(stderr.contains("2 target(s) failed"), "{stderr}");
    // The good target is still emitted.
    assert_eq!(stdout_of(&output).lines().count(), 1);
    Ok(())
}

#[test]
fn detect_cli_prints_host_json() -> Result<()> {
    let output = helper_command("capgen-detect").output()?;
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert!(value["host"]["machine"].is_string());
    assert!(value["host"]["tokens"].is_array());
    if output.status.success() {
        assert!(value["label"].is_string());
        assert!(value.get("error").is_none());
    } else {
        assert!(value["error"].is_string());
    }
    Ok(())
}
