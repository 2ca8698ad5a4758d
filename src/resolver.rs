//! Folds a rule set over a target descriptor into a capability table.
//!
//! The fold is a single ordered pass. Architecture-implied flags enter first,
//! then each matching rule in declaration order. Non-override assignments may
//! repeat an identical value but never disagree; overrides always win over
//! non-override values regardless of which arrived first, and the last
//! override wins among overrides. Guarded defaults only fill gaps. Flags the
//! classifier implies belong to the architecture: rules may re-assert the
//! value for their own family and nothing else. Any failure discards the
//! working table.

use crate::classifier::ArchitectureClassifier;
use crate::error::{AssignmentSite, ResolutionError};
use crate::registry::{CapabilityRegistry, FlagName, FlagValue};
use crate::rules::{AssignMode, RuleSet};
use crate::seed::SeedMap;
use crate::table::{CapabilityTable, ResolvedFlag};
use crate::target::TargetDescriptor;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

static NO_SEEDS: SeedMap = SeedMap::new();

/// Resolve with the standard classifier and no seeds.
pub fn resolve(
    registry: &CapabilityRegistry,
    rules: &RuleSet,
    target: &TargetDescriptor,
) -> Result<CapabilityTable, ResolutionError> {
    let classifier = ArchitectureClassifier::standard();
    Resolver::new(registry, rules, &classifier).resolve(target)
}

/// Read-only view over the inputs of a resolution.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a CapabilityRegistry,
    rules: &'a RuleSet,
    classifier: &'a ArchitectureClassifier,
    seeds: &'a SeedMap,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a CapabilityRegistry,
        rules: &'a RuleSet,
        classifier: &'a ArchitectureClassifier,
    ) -> Self {
        Self {
            registry,
            rules,
            classifier,
            seeds: &NO_SEEDS,
        }
    }

    pub fn with_seeds(mut self, seeds: &'a SeedMap) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn registry(&self) -> &'a CapabilityRegistry {
        self.registry
    }

    pub fn classifier(&self) -> &'a ArchitectureClassifier {
        self.classifier
    }

    pub fn resolve(&self, target: &TargetDescriptor) -> Result<CapabilityTable, ResolutionError> {
        let mut work = WorkingTable {
            registry: self.registry,
            seeds: self.seeds,
            definitional: self
                .classifier
                .predicates()
                .iter()
                .flat_map(|predicate| predicate.implied.iter().map(|(name, _)| name))
                .collect(),
            target: target.label(),
            slots: BTreeMap::new(),
        };

        let classification = self.classifier.classify_family(target.arch)?;
        for (flag, value) in &classification.implied {
            work.apply(flag, Some(value), AssignMode::Set, AssignmentSite::Architecture, &[])?;
        }

        for (index, rule) in self.rules.rules().iter().enumerate() {
            if !rule.matches(target) {
                continue;
            }
            log::debug!("{}: applying rule #{index} ({})", work.target, rule.id);
            for assignment in rule.assignments() {
                let site = AssignmentSite::Rule {
                    index,
                    id: rule.id.clone(),
                };
                work.apply(
                    assignment.flag,
                    assignment.value,
                    assignment.mode,
                    site,
                    assignment.notes,
                )?;
            }
        }

        let entries = work.finish()?;
        Ok(CapabilityTable::new(
            target.clone(),
            self.registry.key().clone(),
            entries,
        ))
    }

    /// Resolve independent targets in parallel; results keep input order.
    pub fn resolve_all(
        &self,
        targets: &[TargetDescriptor],
    ) -> Vec<Result<CapabilityTable, ResolutionError>> {
        targets.par_iter().map(|target| self.resolve(target)).collect()
    }
}

#[derive(Clone)]
struct Stamp {
    value: Option<FlagValue>,
    site: AssignmentSite,
    notes: Vec<String>,
}

#[derive(Default)]
struct Slot {
    assigned: Option<Stamp>,
    overridden: Option<Stamp>,
    fallback: Option<Stamp>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.assigned.is_none() && self.overridden.is_none() && self.fallback.is_none()
    }
}

struct WorkingTable<'a> {
    registry: &'a CapabilityRegistry,
    seeds: &'a SeedMap,
    definitional: BTreeSet<&'a FlagName>,
    target: String,
    slots: BTreeMap<FlagName, Slot>,
}

impl WorkingTable<'_> {
    fn apply(
        &mut self,
        flag: &FlagName,
        value: Option<&FlagValue>,
        mode: AssignMode,
        site: AssignmentSite,
        notes: &[String],
    ) -> Result<(), ResolutionError> {
        let Some(declared) = self.registry.flag(flag) else {
            return Err(ResolutionError::UnknownFlag {
                flag: flag.clone(),
                site,
                target: self.target.clone(),
            });
        };

        if site != AssignmentSite::Architecture && self.definitional.contains(flag) {
            let reasserts = mode == AssignMode::Set
                && self
                    .slots
                    .get(flag)
                    .and_then(|slot| slot.assigned.as_ref())
                    .is_some_and(|assigned| assigned.site == AssignmentSite::Architecture);
            if !reasserts {
                return Err(ResolutionError::DefinitionalFlag {
                    flag: flag.clone(),
                    site,
                    target: self.target.clone(),
                });
            }
        }

        let stamp = Stamp {
            value: value.cloned(),
            site,
            notes: notes.to_vec(),
        };
        let slot = self.slots.entry(flag.clone()).or_default();
        match mode {
            AssignMode::Set => match &slot.assigned {
                Some(existing) if existing.value == stamp.value => {
                    log::trace!("{flag}: {} re-asserts value from {}", stamp.site, existing.site);
                }
                Some(existing) => {
                    return Err(ResolutionError::ConflictingAssignment {
                        flag: flag.clone(),
                        first: existing.site.clone(),
                        second: stamp.site,
                        target: self.target.clone(),
                    });
                }
                None => slot.assigned = Some(stamp),
            },
            AssignMode::Override => {
                if let Some(previous) = &slot.overridden {
                    log::debug!("{flag}: {} replaces override from {}", stamp.site, previous.site);
                }
                slot.overridden = Some(stamp);
            }
            AssignMode::IfAbsent => {
                if !slot.is_empty() {
                    log::debug!("{flag}: guarded default from {} skipped, already set", stamp.site);
                } else if let Some(seeded) = self.seeds.get(flag) {
                    log::debug!("{flag}: guarded default from {} skipped, seeded externally", stamp.site);
                    slot.fallback = Some(Stamp {
                        value: Some(seeded.coerce_to(declared.domain)),
                        site: AssignmentSite::Seed,
                        notes: stamp.notes,
                    });
                } else {
                    slot.fallback = Some(stamp);
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<ResolvedFlag>, ResolutionError> {
        let mut entries = Vec::with_capacity(self.slots.len());
        for flag in self.registry.flags() {
            let Some(slot) = self.slots.remove(&flag.name) else {
                continue;
            };
            let Slot {
                assigned,
                overridden,
                fallback,
            } = slot;

            let (winner, replaced, guarded) = match (overridden, assigned, fallback) {
                (Some(over), assigned, fallback) => {
                    let replaced = assigned.or(fallback).map(|s| s.site);
                    (over, replaced, false)
                }
                (None, Some(assigned), _) => (assigned, None, false),
                (None, None, Some(fallback)) => (fallback, None, true),
                (None, None, None) => continue,
            };

            if let Some(value) = &winner.value {
                if !value.satisfies(flag.domain) {
                    return Err(ResolutionError::DomainViolation {
                        flag: flag.name.clone(),
                        expected: flag.domain,
                        actual: value.to_string(),
                        target: self.target.clone(),
                    });
                }
            }

            entries.push(ResolvedFlag {
                name: flag.name.clone(),
                value: winner.value,
                site: winner.site,
                replaced,
                guarded,
                notes: winner.notes,
            });
        }
        Ok(entries)
    }
}
