//! Resolves one target and emits its config header or capability table.
//!
//! The target comes from a triple, explicit families, or raw predefined-macro
//! tokens. Seeds from `CAPGEN_SEED_<NAME>` are layered under `--seed`
//! arguments. Output goes to stdout unless `--output` names a file, which is
//! replaced atomically.

use anyhow::{Result, anyhow, bail};
use capgen::{
    ArchitectureClassifier, ArchitectureFamily, CapabilityRegistry, CatalogFile, HeaderEmitter,
    OsFamily, Resolver, RuleSet, SeedMap, TargetDescriptor, resolve_catalog_path, split_list,
    write_atomically,
};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
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

    let registry = CapabilityRegistry::load(&registry_path)?;
    let rules = RuleSet::load(&rules_path)?;
    let classifier = ArchitectureClassifier::standard();
    let target = cli.target.descriptor(&classifier)?;

    let mut seeds = SeedMap::from_env();
    seeds.merge(cli.seeds);

    let table = Resolver::new(&registry, &rules, &classifier)
        .with_seeds(&seeds)
        .resolve(&target)?;

    let rendered = match cli.format {
        Format::Header => HeaderEmitter::new(&registry, &classifier).render(&table),
        Format::Json => {
            let mut text = serde_json::to_string_pretty(&table)?;
            text.push('\n');
            text
        }
    };

    match cli.output {
        Some(path) => {
            write_atomically(&path, |tmp| tmp.write_all(rendered.as_bytes()))?;
            log::info!("wrote {} flags for {} to {}", table.len(), table.target, path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Header,
    Json,
}

#[derive(Debug, PartialEq)]
enum TargetArg {
    Triple(String),
    Explicit {
        arch: ArchitectureFamily,
        os: OsFamily,
        variant: Option<String>,
    },
    Tokens {
        tokens: Vec<String>,
        os: OsFamily,
        variant: Option<String>,
    },
}

impl TargetArg {
    fn descriptor(&self, classifier: &ArchitectureClassifier) -> Result<TargetDescriptor> {
        let descriptor = match self {
            TargetArg::Triple(triple) => TargetDescriptor::from_triple(classifier, triple)?,
            TargetArg::Explicit { arch, os, variant } => {
                classifier.classify_family(*arch)?;
                TargetDescriptor::new(*arch, *os, variant.as_deref())
            }
            TargetArg::Tokens {
                tokens,
                os,
                variant,
            } => TargetDescriptor::from_tokens(classifier, tokens, *os, variant.as_deref())?,
        };
        Ok(descriptor)
    }
}

#[derive(Debug)]
struct Cli {
    registry: Option<PathBuf>,
    rules: Option<PathBuf>,
    target: TargetArg,
    seeds: SeedMap,
    format: Format,
    output: Option<PathBuf>,
}

impl Cli {
    fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let mut registry = None;
        let mut rules = None;
        let mut triple = None;
        let mut arch = None;
        let mut os = None;
        let mut variant = None;
        let mut tokens = None;
        let mut seeds = SeedMap::new();
        let mut format = Format::Header;
        let mut output = None;

        while let Some(arg) = args.next() {
            let arg_str = arg
                .to_str()
                .ok_or_else(|| anyhow!("invalid UTF-8 in argument"))?;
            match arg_str {
                "--registry" => registry = Some(PathBuf::from(next_value("--registry", &mut args)?)),
                "--rules" => rules = Some(PathBuf::from(next_value("--rules", &mut args)?)),
                "--output" => output = Some(PathBuf::from(next_value("--output", &mut args)?)),
                "--triple" => triple = Some(next_value("--triple", &mut args)?),
                "--arch" => {
                    let value = next_value("--arch", &mut args)?;
                    arch = Some(
                        ArchitectureFamily::parse(&value)
                            .ok_or_else(|| anyhow!("unknown architecture family: {value}"))?,
                    );
                }
                "--os" => {
                    let value = next_value("--os", &mut args)?;
                    os = Some(
                        OsFamily::parse(&value)
                            .ok_or_else(|| anyhow!("unknown OS family: {value}"))?,
                    );
                }
                "--variant" => variant = Some(next_value("--variant", &mut args)?),
                "--tokens" => tokens = Some(split_list(&next_value("--tokens", &mut args)?)),
                "--seed" => {
                    let (name, value) = SeedMap::parse_assignment(&next_value("--seed", &mut args)?)?;
                    seeds.insert(name, value);
                }
                "--format" => {
                    format = match next_value("--format", &mut args)?.as_str() {
                        "header" => Format::Header,
                        "json" => Format::Json,
                        other => bail!("unknown format: {other} (expected header or json)"),
                    }
                }
                "--help" | "-h" => usage(0),
                other => bail!("unknown argument: {other}"),
            }
        }

        let target = match (triple, tokens, arch, os) {
            (Some(triple), None, None, None) => {
                if variant.is_some() {
                    bail!("--variant cannot be combined with --triple");
                }
                TargetArg::Triple(triple)
            }
            (Some(_), ..) => bail!("--triple cannot be combined with --arch, --os or --tokens"),
            (None, Some(_), Some(_), _) => bail!("--tokens and --arch are mutually exclusive"),
            (None, Some(tokens), None, Some(os)) => TargetArg::Tokens {
                tokens,
                os,
                variant,
            },
            (None, None, Some(arch), Some(os)) => TargetArg::Explicit { arch, os, variant },
            (None, Some(_), None, None) | (None, None, Some(_), None) => {
                bail!("--os is required with --arch or --tokens")
            }
            (None, None, None, _) => {
                bail!("a target is required: --triple, --arch with --os, or --tokens with --os")
            }
        };

        Ok(Self {
            registry,
            rules,
            target,
            seeds,
            format,
            output,
        })
    }
}

fn next_value(flag: &str, args: &mut impl Iterator<Item = OsString>) -> Result<String> {
    let value = args
        .next()
        .ok_or_else(|| anyhow!("{flag} requires a value"))?
        .into_string()
        .map_err(|_| anyhow!("{flag} must be valid UTF-8"))?;
    if value.trim().is_empty() {
        bail!("{flag} must not be empty");
    }
    Ok(value)
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: capgen-resolve [--registry PATH] [--rules PATH] TARGET [--seed NAME=VALUE]... [--format header|json] [--output PATH]\n\nTARGET is one of:\n  --triple TRIPLE                 e.g. aarch64-unknown-nto-qnx710\n  --arch FAMILY --os OS [--variant V]\n  --tokens LIST --os OS [--variant V]   predefined macros, comma or space separated\n\nOptions:\n  --registry PATH           Override capability registry (or set CAPGEN_REGISTRY).\n  --rules PATH              Override rule set (or set CAPGEN_RULES).\n  --seed NAME=VALUE         Pre-seed a guarded flag (also CAPGEN_SEED_<NAME>).\n  --format header|json      Emit the C header (default) or the table as JSON.\n  --output PATH             Write atomically to PATH instead of stdout.\n  --help                    Show this help text."
    );
    std::process::exit(code);
}
