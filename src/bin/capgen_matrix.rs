//! Resolves every target in the target list and emits the results.
//!
//! Targets are resolved in parallel. Without `--out-dir` each table is printed
//! as one compact JSON line, in target-list order; with it, one `<name>.h` is
//! written per target. Every failure is reported before the process exits
//! non-zero, so one bad target does not hide another.

use anyhow::{Result, anyhow, bail};
use capgen::{
    ArchitectureClassifier, CapabilityRegistry, CatalogFile, HeaderEmitter, Resolver, RuleSet,
    SeedMap, TargetDescriptor, TargetSpec, load_targets, resolve_catalog_path,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::env;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse(env::args_os().skip(1))?;
    let registry_path = resolve_catalog_path(CatalogFile::Registry, cli.registry.as_deref())?;
    let rules_path = resolve_catalog_path(CatalogFile::Rules, cli.rules.as_deref())?;
    let targets_path = resolve_catalog_path(CatalogFile::Targets, cli.targets.as_deref())?;

    let registry = CapabilityRegistry::load(&registry_path)?;
    let rules = RuleSet::load(&rules_path)?;
    let specs = load_targets(&targets_path)?;
    let classifier = ArchitectureClassifier::standard();
    let seeds = SeedMap::from_env();

    for warning in rules.lint(&registry) {
        log::warn!("{warning}");
    }

    let mut errors: Vec<String> = Vec::new();
    let (named, descriptor_errors) = describe_targets(&specs, &classifier);
    errors.extend(descriptor_errors);

    let descriptors: Vec<TargetDescriptor> = named.iter().map(|(_, d)| d.clone()).collect();
    let results = Resolver::new(&registry, &rules, &classifier)
        .with_seeds(&seeds)
        .resolve_all(&descriptors);

    let emitter = HeaderEmitter::new(&registry, &classifier);
    for ((name, _), result) in named.iter().zip(results) {
        let table = match result {
            Ok(table) => table,
            Err(err) => {
                let message = format!("target {name}: {err}");
                eprintln!("capgen-matrix: {message}");
                errors.push(message);
                continue;
            }
        };
        let outcome = match &cli.out_dir {
            Some(dir) => emitter.write_to_path(&table, &header_path(dir, name)),
            None => table
                .to_json()
                .map(|line| println!("{line}"))
                .map_err(Into::into),
        };
        if let Err(err) = outcome {
            let message = format!("target {name}: {err:#}");
            eprintln!("capgen-matrix: {message}");
            errors.push(message);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "{} target(s) failed; see stderr for details:\n{}",
            errors.len(),
            errors.join("\n")
        )
    }
}

/// Classify each spec, keeping the output name next to its descriptor.
fn describe_targets(
    specs: &[TargetSpec],
    classifier: &ArchitectureClassifier,
) -> (Vec<(String, TargetDescriptor)>, Vec<String>) {
    let mut named = Vec::new();
    let mut errors = Vec::new();
    for (index, spec) in specs.iter().enumerate() {
        match spec.descriptor(classifier) {
            Ok(descriptor) => named.push((spec.label(&descriptor), descriptor)),
            Err(err) => {
                let message = format!("target #{index}: {err}");
                eprintln!("capgen-matrix: {message}");
                errors.push(message);
            }
        }
    }
    (named, errors)
}

fn header_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.h"))
}

struct Cli {
    registry: Option<PathBuf>,
    rules: Option<PathBuf>,
    targets: Option<PathBuf>,
    out_dir: Option<PathBuf>,
}

impl Cli {
    fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let mut registry = None;
        let mut rules = None;
        let mut targets = None;
        let mut out_dir = None;

        while let Some(arg) = args.next() {
            let arg_str = arg
                .to_str()
                .ok_or_else(|| anyhow!("invalid UTF-8 in argument"))?;
            match arg_str {
                "--registry" => registry = Some(next_path("--registry", &mut args)?),
                "--rules" => rules = Some(next_path("--rules", &mut args)?),
                "--targets" => targets = Some(next_path("--targets", &mut args)?),
                "--out-dir" => out_dir = Some(next_path("--out-dir", &mut args)?),
                "--help" | "-h" => usage(0),
                other => bail!("unknown argument: {other}"),
            }
        }

        Ok(Self {
            registry,
            rules,
            targets,
            out_dir,
        })
    }
}

fn next_path(flag: &str, args: &mut impl Iterator<Item = OsString>) -> Result<PathBuf> {
    let value = args
        .next()
        .ok_or_else(|| anyhow!("{flag} requires a value"))?;
    let path = PathBuf::from(
        value
            .into_string()
            .map_err(|_| anyhow!("{flag} must be valid UTF-8"))?,
    );
    if path.as_os_str().is_empty() {
        bail!("{flag} must not be empty");
    }
    Ok(path)
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: capgen-matrix [--registry PATH] [--rules PATH] [--targets PATH] [--out-dir DIR]\n\nOptions:\n  --registry PATH           Override capability registry (or set CAPGEN_REGISTRY).\n  --rules PATH              Override rule set (or set CAPGEN_RULES).\n  --targets PATH            Override target list (or set CAPGEN_TARGETS).\n  --out-dir DIR             Write <name>.h per target instead of NDJSON on stdout.\n  --help                    Show this help text."
    );
    std::process::exit(code);
}
