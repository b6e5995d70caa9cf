//! Deterministic partitioning of experiments by recipe.
//!
//! Each applicable recipe yields one [`GroupingOption`]: a partition of the
//! experiment list where experiments with identical signatures share a
//! group. Groups are emitted in order of first appearance and numbered from
//! 1, so identical input always yields identical output, IDs included.

pub mod binning;
pub mod recipes;

pub use binning::{BinningKind, TemperatureBinning, UNSPECIFIED_BIN};
pub use recipes::{KeyFactor, Recipe};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strum::IntoEnumIterator;

use crate::factors::ResolvedFactors;
use crate::ids::{ExperimentId, GroupId};

/// Factor name → effective (possibly binned) value. `None` is the stable
/// sentinel for a missing value and serializes as `null`.
pub type Signature = BTreeMap<String, Option<String>>;

/// Signature key used by the one-per-experiment recipe.
pub const EXPERIMENT_SIGNATURE_KEY: &str = "experimentId";

const MISSING_LABEL: &str = "(missing)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A key factor is null for some members.
    MissingFactor,
    /// A factor outside the key takes more than one value inside the group.
    MixedFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWarning {
    pub kind: WarningKind,
    pub factor: String,
    pub message: String,
}

impl GroupWarning {
    pub fn missing(factor: &str, missing: usize, total: usize) -> Self {
        Self {
            kind: WarningKind::MissingFactor,
            factor: factor.to_string(),
            message: format!("{factor} is missing for {missing} of {total} experiments"),
        }
    }

    pub fn mixed(factor: &str, values: &BTreeSet<String>) -> Self {
        let listed: Vec<&str> = values.iter().map(String::as_str).collect();
        Self {
            kind: WarningKind::MixedFactor,
            factor: factor.to_string(),
            message: format!("{factor} varies within group: {}", listed.join(", ")),
        }
    }
}

impl fmt::Display for GroupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub experiment_ids: Vec<ExperimentId>,
    #[serde(default)]
    pub signature: Signature,
    #[serde(default)]
    pub warnings: Vec<GroupWarning>,
}

impl Group {
    pub fn empty(group_id: GroupId, name: impl Into<String>) -> Self {
        Self {
            group_id,
            name: name.into(),
            experiment_ids: Vec::new(),
            signature: Signature::new(),
            warnings: Vec::new(),
        }
    }

    pub fn contains(&self, experiment: &str) -> bool {
        self.experiment_ids.iter().any(|id| id.as_str() == experiment)
    }
}

/// The partition produced by one recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingOption {
    pub recipe_id: Recipe,
    pub description: String,
    pub factors_used: Vec<String>,
    pub groups: Vec<Group>,
}

impl GroupingOption {
    /// Copy of the groups for the manual editor to work on.
    pub fn editable_groups(&self) -> Vec<Group> {
        self.groups.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeGenerator {
    binning: TemperatureBinning,
}

impl RecipeGenerator {
    pub fn new(binning: TemperatureBinning) -> Self {
        Self { binning }
    }

    pub fn binning(&self) -> TemperatureBinning {
        self.binning
    }

    /// One option per applicable recipe, in catalogue order.
    ///
    /// Duplicate experiment IDs are collapsed to their first occurrence.
    pub fn generate(
        &self,
        experiments: &[ExperimentId],
        resolved: &ResolvedFactors,
        available: &[String],
    ) -> Vec<GroupingOption> {
        let experiments: Vec<&ExperimentId> = experiments
            .iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        if experiments.is_empty() {
            return Vec::new();
        }

        let options: Vec<GroupingOption> = Recipe::iter()
            .filter(|recipe| is_applicable(*recipe, &experiments, resolved, available))
            .map(|recipe| {
                let groups = match recipe {
                    Recipe::AllInOne => vec![self.all_in_one(&experiments, resolved, available)],
                    Recipe::OnePerExperiment => one_per_experiment(&experiments),
                    keyed => self.keyed(keyed, &experiments, resolved, available),
                };
                tracing::debug!(recipe_id = recipe.id(), groups = groups.len(), "built grouping option");
                GroupingOption {
                    recipe_id: recipe,
                    description: recipe.description().to_string(),
                    factors_used: recipe.factors_used(),
                    groups,
                }
            })
            .collect();

        tracing::info!(
            experiments = experiments.len(),
            options = options.len(),
            "generated grouping options"
        );
        options
    }

    fn signature_value(&self, key: &KeyFactor, experiment: &ExperimentId, resolved: &ResolvedFactors) -> Option<String> {
        let value = resolved.get(experiment.as_str(), key.name);
        if key.binned {
            Some(self.binning.bin(value))
        } else {
            value.map(|v| v.as_key())
        }
    }

    fn keyed(
        &self,
        recipe: Recipe,
        experiments: &[&ExperimentId],
        resolved: &ResolvedFactors,
        available: &[String],
    ) -> Vec<Group> {
        let key = recipe.key();
        let mut buckets: IndexMap<Vec<Option<String>>, Vec<ExperimentId>> = IndexMap::new();
        for experiment in experiments {
            let tuple = key
                .iter()
                .map(|k| self.signature_value(k, experiment, resolved))
                .collect();
            buckets.entry(tuple).or_default().push((*experiment).clone());
        }

        buckets
            .into_iter()
            .enumerate()
            .map(|(index, (tuple, members))| {
                let signature: Signature = key
                    .iter()
                    .zip(tuple.iter())
                    .map(|(k, v)| (k.name.to_string(), v.clone()))
                    .collect();
                let name = key
                    .iter()
                    .zip(tuple.iter())
                    .map(|(k, v)| format!("{}: {}", k.name, v.as_deref().unwrap_or(MISSING_LABEL)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let warnings = group_warnings(key, &members, resolved, available);
                Group {
                    group_id: GroupId::for_recipe(recipe.id(), index + 1),
                    name,
                    experiment_ids: members,
                    signature,
                    warnings,
                }
            })
            .collect()
    }

    fn all_in_one(&self, experiments: &[&ExperimentId], resolved: &ResolvedFactors, available: &[String]) -> Group {
        let members: Vec<ExperimentId> = experiments.iter().map(|e| (*e).clone()).collect();
        let warnings = group_warnings(&[], &members, resolved, available);
        Group {
            group_id: GroupId::for_recipe(Recipe::AllInOne.id(), 1),
            name: "All experiments".to_string(),
            experiment_ids: members,
            signature: Signature::new(),
            warnings,
        }
    }
}

/// Generate with the default binning.
pub fn generate(
    experiments: &[ExperimentId],
    resolved: &ResolvedFactors,
    available: &[String],
) -> Vec<GroupingOption> {
    RecipeGenerator::default().generate(experiments, resolved, available)
}

/// Every key factor must be available and non-null for some experiment.
fn is_applicable(
    recipe: Recipe,
    experiments: &[&ExperimentId],
    resolved: &ResolvedFactors,
    available: &[String],
) -> bool {
    recipe.key().iter().all(|k| {
        available.iter().any(|name| name == k.name)
            && experiments
                .iter()
                .any(|e| resolved.get(e.as_str(), k.name).is_some())
    })
}

fn one_per_experiment(experiments: &[&ExperimentId]) -> Vec<Group> {
    experiments
        .iter()
        .enumerate()
        .map(|(index, experiment)| Group {
            group_id: GroupId::for_recipe(Recipe::OnePerExperiment.id(), index + 1),
            name: experiment.to_string(),
            experiment_ids: vec![(*experiment).clone()],
            signature: Signature::from([(
                EXPERIMENT_SIGNATURE_KEY.to_string(),
                Some(experiment.to_string()),
            )]),
            warnings: Vec::new(),
        })
        .collect()
}

/// Missing-key warnings for unbinned key factors, then mixed-value warnings
/// for available factors outside the key.
fn group_warnings(
    key: &[KeyFactor],
    members: &[ExperimentId],
    resolved: &ResolvedFactors,
    available: &[String],
) -> Vec<GroupWarning> {
    let mut warnings = Vec::new();
    for k in key.iter().filter(|k| !k.binned) {
        let missing = members
            .iter()
            .filter(|m| resolved.get(m.as_str(), k.name).is_none())
            .count();
        if missing > 0 {
            warnings.push(GroupWarning::missing(k.name, missing, members.len()));
        }
    }
    for factor in available {
        if key.iter().any(|k| k.name == factor) {
            continue;
        }
        let values: BTreeSet<String> = members
            .iter()
            .filter_map(|m| resolved.get(m.as_str(), factor))
            .map(|v| v.as_key())
            .collect();
        if values.len() > 1 {
            warnings.push(GroupWarning::mixed(factor, &values));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{
        ADDITIVE, CATALYST, ExtractedFactors, FactorValue, OverrideMap, TEMPERATURE,
    };

    fn table(rows: &[(&str, &[(&str, &str)])]) -> (Vec<ExperimentId>, ResolvedFactors, Vec<String>) {
        let experiments: Vec<ExperimentId> = rows.iter().map(|(id, _)| ExperimentId::new(*id)).collect();
        let mut extracted = ExtractedFactors::new();
        for (id, factors) in rows {
            extracted.insert(
                ExperimentId::new(*id),
                factors
                    .iter()
                    .map(|(name, value)| FactorValue::new(*name, Some((*value).into())))
                    .collect(),
            );
        }
        let overrides = OverrideMap::new();
        let names = ResolvedFactors::factor_names_from(&experiments, &extracted, &overrides);
        let resolved = ResolvedFactors::build(&experiments, &extracted, &overrides, &names);
        let available = resolved.available_factor_names();
        (experiments, resolved, available)
    }

    fn option(options: &[GroupingOption], recipe: Recipe) -> &GroupingOption {
        options
            .iter()
            .find(|o| o.recipe_id == recipe)
            .unwrap_or_else(|| panic!("{recipe} missing"))
    }

    #[test]
    fn catalyst_and_additive_recipes() {
        let (experiments, resolved, available) = table(&[
            ("e1", &[(CATALYST, "Pd/C"), (ADDITIVE, "TEA")]),
            ("e2", &[(CATALYST, "Pd/C"), (ADDITIVE, "DMAP")]),
        ]);
        let options = generate(&experiments, &resolved, &available);

        let by_catalyst = option(&options, Recipe::ByCatalyst);
        assert_eq!(by_catalyst.groups.len(), 1);
        assert_eq!(by_catalyst.groups[0].experiment_ids.len(), 2);
        assert_eq!(by_catalyst.groups[0].group_id.as_str(), "group-by-catalyst-1");
        assert_eq!(by_catalyst.groups[0].name, "catalyst: Pd/C");
        assert_eq!(by_catalyst.groups[0].warnings, vec![GroupWarning::mixed(
            ADDITIVE,
            &BTreeSet::from(["DMAP".to_string(), "TEA".to_string()])
        )]);

        let by_pair = option(&options, Recipe::ByCatalystAdditive);
        assert_eq!(by_pair.groups.len(), 2);
        assert!(by_pair.groups.iter().all(|g| g.experiment_ids.len() == 1));
        assert!(by_pair.groups.iter().all(|g| g.warnings.is_empty()));
    }

    #[test]
    fn inapplicable_recipes_are_skipped() {
        let (experiments, resolved, available) = table(&[("e1", &[(CATALYST, "Pd/C")])]);
        let ids: Vec<Recipe> = generate(&experiments, &resolved, &available)
            .into_iter()
            .map(|o| o.recipe_id)
            .collect();
        assert_eq!(ids, vec![Recipe::ByCatalyst, Recipe::AllInOne, Recipe::OnePerExperiment]);
    }

    #[test]
    fn missing_key_values_share_a_null_group_and_warn() {
        let (experiments, resolved, available) = table(&[
            ("e1", &[(CATALYST, "Pd/C")]),
            ("e2", &[(ADDITIVE, "TEA")]),
            ("e3", &[]),
        ]);
        let options = generate(&experiments, &resolved, &available);
        let by_catalyst = option(&options, Recipe::ByCatalyst);
        assert_eq!(by_catalyst.groups.len(), 2);
        let missing = &by_catalyst.groups[1];
        assert_eq!(missing.signature[CATALYST], None);
        assert_eq!(missing.name, "catalyst: (missing)");
        assert_eq!(missing.experiment_ids, vec![ExperimentId::new("e2"), ExperimentId::new("e3")]);
        assert_eq!(missing.warnings[0].kind, WarningKind::MissingFactor);
        assert_eq!(missing.warnings[0].message, "catalyst is missing for 2 of 2 experiments");
    }

    #[test]
    fn temperature_bins_never_warn_missing() {
        let (experiments, resolved, available) = table(&[
            ("e1", &[(TEMPERATURE, "25")]),
            ("e2", &[(TEMPERATURE, "reflux")]),
            ("e3", &[(TEMPERATURE, "80 C")]),
            ("e4", &[]),
        ]);
        let options = generate(&experiments, &resolved, &available);
        let by_temp = option(&options, Recipe::ByTemperatureBin);
        let labels: Vec<Option<String>> = by_temp
            .groups
            .iter()
            .map(|g| g.signature[TEMPERATURE].clone())
            .collect();
        assert_eq!(
            labels,
            vec![Some("<30".into()), Some(UNSPECIFIED_BIN.into()), Some("60-89".into())]
        );
        assert_eq!(by_temp.groups[1].experiment_ids.len(), 2);
        assert!(by_temp.groups.iter().all(|g| g.warnings.is_empty()));
    }

    #[test]
    fn structural_recipes() {
        let (experiments, resolved, available) = table(&[
            ("e1", &[(CATALYST, "Pd/C")]),
            ("e2", &[(CATALYST, "Pt/C")]),
        ]);
        let options = generate(&experiments, &resolved, &available);
        let all = option(&options, Recipe::AllInOne);
        assert_eq!(all.groups.len(), 1);
        assert_eq!(all.groups[0].warnings[0].kind, WarningKind::MixedFactor);
        let singles = option(&options, Recipe::OnePerExperiment);
        assert_eq!(singles.groups.len(), 2);
        assert_eq!(
            singles.groups[1].signature[EXPERIMENT_SIGNATURE_KEY].as_deref(),
            Some("e2")
        );
    }

    #[test]
    fn duplicate_and_empty_experiment_lists() {
        let (_, resolved, available) = table(&[("e1", &[(CATALYST, "Pd/C")])]);
        let doubled = vec![ExperimentId::new("e1"), ExperimentId::new("e1")];
        let options = generate(&doubled, &resolved, &available);
        assert!(options.iter().all(|o| o.groups.iter().map(|g| g.experiment_ids.len()).sum::<usize>() == 1));
        assert!(generate(&[], &resolved, &available).is_empty());
    }

    #[test]
    fn generation_is_deterministic() {
        let (experiments, resolved, available) = table(&[
            ("e1", &[(CATALYST, "Pd/C"), (TEMPERATURE, "45")]),
            ("e2", &[(CATALYST, "Pt/C"), (TEMPERATURE, "95")]),
            ("e3", &[(CATALYST, "Pd/C")]),
        ]);
        let first = generate(&experiments, &resolved, &available);
        let second = generate(&experiments, &resolved, &available);
        assert_eq!(first, second);
    }
}
