//! C preprocessor rendering of capability tables.
//!
//! Layout of an emitted header:
//!
//! ```text
//! #pragma once
//!
//! #if defined(__i386__)
//! #define ARCHITECTURE_IS_X86 1
//! #elif ...
//! #else
//! #error Unknown architecture when building!
//! #endif
//!
//! //<group title>
//! #define NAME VALUE
//! #ifndef GUARDED
//! #define GUARDED VALUE
//! #endif
//! // note attached by the winning rule
//! // #define REMOVED 0
//! ```
//!
//! Sections follow the registry's group order and flags inside a section follow
//! declaration order. A removed flag is written as a commented-out define so
//! the header records the decision without defining anything. Architecture
//! implied flags live only inside the chain, so no name is defined twice.

use crate::classifier::ArchitectureClassifier;
use crate::error::AssignmentSite;
use crate::registry::{CapabilityFlag, CapabilityRegistry, FlagName, FlagValue, Rendering, ValueDomain};
use crate::table::{CapabilityTable, ResolvedFlag};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub const DEFAULT_UNKNOWN_ARCH_MESSAGE: &str = "Unknown architecture when building!";

#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub pragma_once: bool,
    /// Emit the `#if defined(...)` architecture chain.
    pub architecture_chain: bool,
    /// Text of the `#error` in the chain's `#else` arm.
    pub unknown_architecture_message: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            pragma_once: true,
            architecture_chain: true,
            unknown_architecture_message: DEFAULT_UNKNOWN_ARCH_MESSAGE.to_string(),
        }
    }
}

pub struct HeaderEmitter<'a> {
    registry: &'a CapabilityRegistry,
    classifier: &'a ArchitectureClassifier,
    options: EmitOptions,
}

impl<'a> HeaderEmitter<'a> {
    pub fn new(registry: &'a CapabilityRegistry, classifier: &'a ArchitectureClassifier) -> Self {
        Self {
            registry,
            classifier,
            options: EmitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EmitOptions) -> Self {
        self.options = options;
        self
    }

    /// Display adapter over one table; formatting cannot fail.
    pub fn header<'t>(&'t self, table: &'t CapabilityTable) -> Header<'t> {
        Header {
            emitter: self,
            table,
        }
    }

    pub fn render(&self, table: &CapabilityTable) -> String {
        self.header(table).to_string()
    }

    pub fn write<W: Write>(&self, table: &CapabilityTable, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self.header(table))?;
        out.flush()
    }

    /// Write the header to `path`; see [`write_atomically`].
    pub fn write_to_path(&self, table: &CapabilityTable, path: &Path) -> Result<()> {
        write_atomically(path, |tmp| self.write(table, tmp))
            .with_context(|| format!("writing header for {}", table.target))?;
        log::info!(
            "wrote {} flags for {} to {}",
            table.len(),
            table.target,
            path.display()
        );
        Ok(())
    }

    fn write_chain(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for predicate in self.classifier.predicates() {
            let condition = predicate
                .indicators
                .iter()
                .map(|indicator| format!("defined({indicator})"))
                .collect::<Vec<_>>()
                .join(" || ");
            let keyword = if first { "#if" } else { "#elif" };
            writeln!(f, "{keyword} {condition}")?;
            first = false;
            for (name, value) in &predicate.implied {
                self.write_define(f, name, value)?;
            }
        }
        if first {
            return Ok(());
        }
        writeln!(f, "#else")?;
        writeln!(f, "#error {}", self.options.unknown_architecture_message)?;
        writeln!(f, "#endif")
    }

    fn write_define(&self, f: &mut fmt::Formatter<'_>, name: &FlagName, value: &FlagValue) -> fmt::Result {
        match render_value(self.registry.flag(name), value) {
            Some(literal) => writeln!(f, "#define {name} {literal}"),
            None => writeln!(f, "#define {name}"),
        }
    }

    fn write_entry(&self, f: &mut fmt::Formatter<'_>, entry: &ResolvedFlag) -> fmt::Result {
        for note in &entry.notes {
            write_comment(f, note)?;
        }
        let Some(value) = &entry.value else {
            return self.write_removed(f, entry);
        };
        if entry.guarded {
            writeln!(f, "#ifndef {}", entry.name)?;
            self.write_define(f, &entry.name, value)?;
            writeln!(f, "#endif")
        } else {
            self.write_define(f, &entry.name, value)
        }
    }

    fn write_removed(&self, f: &mut fmt::Formatter<'_>, entry: &ResolvedFlag) -> fmt::Result {
        let flag = self.registry.flag(&entry.name);
        if entry.notes.is_empty() {
            if let Some(flag) = flag {
                for line in flag.rationale.lines() {
                    write_comment(f, line)?;
                }
            }
        }
        match flag.map(|flag| flag.domain) {
            Some(ValueDomain::Boolean) => writeln!(f, "// #define {} 0", entry.name),
            _ => writeln!(f, "// #define {}", entry.name),
        }
    }
}

fn write_comment(f: &mut fmt::Formatter<'_>, line: &str) -> fmt::Result {
    if line.is_empty() {
        writeln!(f, "//")
    } else {
        writeln!(f, "// {line}")
    }
}

/// Replace `path` with whatever `fill` writes, through a sibling temporary file.
///
/// The destination only changes once the complete content is synced to disk.
/// A failure at any step leaves a previous file untouched and no temporary
/// file behind.
pub fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    fill(&mut tmp).with_context(|| format!("writing temporary file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("syncing temporary file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("persisting {}", path.display()))?;
    Ok(())
}

/// Header text for one table; see [`HeaderEmitter::header`].
pub struct Header<'t> {
    emitter: &'t HeaderEmitter<'t>,
    table: &'t CapabilityTable,
}

impl fmt::Display for Header<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let emitter = self.emitter;
        let options = &emitter.options;
        let mut started = false;

        if options.pragma_once {
            writeln!(f, "#pragma once")?;
            started = true;
        }
        if options.architecture_chain && !emitter.classifier.predicates().is_empty() {
            if started {
                writeln!(f)?;
            }
            emitter.write_chain(f)?;
            started = true;
        }

        let by_name: BTreeMap<&FlagName, &ResolvedFlag> =
            self.table.entries().iter().map(|e| (&e.name, e)).collect();

        for group in emitter.registry.groups() {
            let lines: Vec<&ResolvedFlag> = emitter
                .registry
                .flags_in(&group.id)
                .filter_map(|flag| by_name.get(&flag.name).copied())
                .filter(|entry| entry.site != AssignmentSite::Architecture)
                .collect();
            if lines.is_empty() {
                continue;
            }
            if started {
                writeln!(f)?;
            }
            started = true;
            if let Some(title) = &group.title {
                writeln!(f, "//{title}")?;
            }
            for entry in lines {
                emitter.write_entry(f, entry)?;
            }
        }
        Ok(())
    }
}

/// Preprocessor spelling of a value; `None` means a bare `#define NAME`.
///
/// Values of unregistered names (only possible for classifier-implied flags)
/// use decimal rendering and quote text.
pub fn render_value(flag: Option<&CapabilityFlag>, value: &FlagValue) -> Option<String> {
    let render = flag.map(|f| f.render).unwrap_or_default();
    let symbol = flag.is_some_and(|f| f.domain == ValueDomain::Symbol);
    let literal = match value {
        FlagValue::Bool(true) if render == Rendering::Bare => return None,
        FlagValue::Bool(value) => (if *value { "1" } else { "0" }).to_string(),
        FlagValue::Int(value) if render == Rendering::Hex => {
            if *value < 0 {
                format!("-{:#x}", value.unsigned_abs())
            } else {
                format!("{value:#x}")
            }
        }
        FlagValue::Int(value) => value.to_string(),
        FlagValue::Text(text) if symbol => text.clone(),
        FlagValue::Text(text) => quote_c_string(text),
    };
    Some(literal)
}

fn quote_c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
