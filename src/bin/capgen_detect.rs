//! Reports the running host as a capgen target.
//!
//! Emits a JSON object with the raw `uname` fields, the derived indicator
//! tokens, and the classified descriptor. An unclassifiable host still prints
//! its raw fields, with the failure under `error`, and exits 1.

use anyhow::{Result, bail};
use capgen::{ArchitectureClassifier, HostInfo, TargetDescriptor};
use serde::Serialize;
use std::env;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct HostReport {
    host: HostInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<TargetDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run() -> Result<()> {
    parse_cli()?;
    let host = HostInfo::detect();
    let report = build_report(host, &ArchitectureClassifier::standard());
    println!("{}", serde_json::to_string(&report)?);
    if let Some(error) = report.error {
        bail!("{error}");
    }
    Ok(())
}

fn build_report(host: HostInfo, classifier: &ArchitectureClassifier) -> HostReport {
    match host.descriptor(classifier) {
        Ok(target) => HostReport {
            label: Some(target.label()),
            target: Some(target),
            host,
            error: None,
        },
        Err(err) => HostReport {
            host,
            target: None,
            label: None,
            error: Some(err.to_string()),
        },
    }
}

fn parse_cli() -> Result<()> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(()),
        Some("-h" | "--help") => usage(0),
        Some(other) => bail!("unexpected argument: {other}"),
    }
}

fn usage(code: i32) -> ! {
    eprintln!("Usage: capgen-detect");
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_target_for_known_hosts() {
        let report = build_report(HostInfo::detect(), &ArchitectureClassifier::standard());
        assert!(report.target.is_some() || report.error.is_some());
        assert_eq!(report.label.is_some(), report.target.is_some());
    }

    #[test]
    fn empty_classifier_reports_error() {
        let report = build_report(HostInfo::detect(), &ArchitectureClassifier::new(Vec::new()));
        assert!(report.target.is_none());
        assert!(report.error.is_some());
    }
}
