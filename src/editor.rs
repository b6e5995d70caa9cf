//! User-driven edits of a partition.
//!
//! Every operation takes the current snapshot by reference and returns a new
//! one; a previous snapshot is never mutated. No operation can place an
//! experiment in two groups. An experiment may be absent from every group.
//!
//! Invalid references are handled per [`EditPolicy`]: `Lenient` returns the
//! input unchanged, `Strict` returns an [`EditError`].

use clap::ValueEnum;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::grouping::{Group, Signature};
use crate::ids::{ExperimentId, GroupId};

const DEFAULT_GROUP_NAME: &str = "New group";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditPolicy {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),

    #[error("group name cannot be empty")]
    EmptyName,

    #[error("merge needs at least two existing groups (found {found})")]
    NotEnoughGroups { found: usize },

    #[error("invalid split of group {group_id}: {reason}")]
    InvalidSplit { group_id: GroupId, reason: String },

    #[error("experiment {experiment_id} is in both {first} and {second}")]
    DuplicateMembership {
        experiment_id: ExperimentId,
        first: GroupId,
        second: GroupId,
    },

    #[error("group id {0} is used more than once")]
    DuplicateGroupId(GroupId),
}

/// A user edit, as routed from the interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditAction {
    Move {
        experiment_id: ExperimentId,
        target_group_id: GroupId,
    },
    Create {
        name: String,
    },
    Rename {
        group_id: GroupId,
        name: String,
    },
    Merge {
        group_ids: Vec<GroupId>,
        name: String,
    },
    Split {
        group_id: GroupId,
        partitions: Vec<Vec<ExperimentId>>,
    },
}

impl EditAction {
    pub fn operation(&self) -> &'static str {
        match self {
            EditAction::Move { .. } => "move",
            EditAction::Create { .. } => "create",
            EditAction::Rename { .. } => "rename",
            EditAction::Merge { .. } => "merge",
            EditAction::Split { .. } => "split",
        }
    }
}

pub type EditResult = Result<Vec<Group>, EditError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupEditor {
    policy: EditPolicy,
}

impl GroupEditor {
    pub fn new(policy: EditPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EditPolicy {
        self.policy
    }

    pub fn apply(&self, groups: &[Group], action: &EditAction) -> EditResult {
        match action {
            EditAction::Move {
                experiment_id,
                target_group_id,
            } => self.move_experiment(groups, experiment_id, target_group_id),
            EditAction::Create { name } => self.create_group(groups, name),
            EditAction::Rename { group_id, name } => self.rename_group(groups, group_id, name),
            EditAction::Merge { group_ids, name } => self.merge_groups(groups, group_ids, name),
            EditAction::Split {
                group_id,
                partitions,
            } => self.split_group(groups, group_id, partitions),
        }
    }

    /// Remove `experiment_id` from every group, then add it to `target`.
    pub fn move_experiment(
        &self,
        groups: &[Group],
        experiment_id: &ExperimentId,
        target: &GroupId,
    ) -> EditResult {
        if position(groups, target).is_none() {
            return self.reject(groups, EditError::UnknownGroup(target.clone()));
        }
        let next = groups
            .iter()
            .map(|group| {
                let mut group = group.clone();
                if group.group_id == *target {
                    if !group.experiment_ids.contains(experiment_id) {
                        group.experiment_ids.push(experiment_id.clone());
                    }
                } else {
                    group.experiment_ids.retain(|id| id != experiment_id);
                }
                group
            })
            .collect();
        tracing::debug!(experiment = %experiment_id, target = %target, "moved experiment");
        Ok(next)
    }

    /// Append an empty group.
    pub fn create_group(&self, groups: &[Group], name: &str) -> EditResult {
        let name = match self.clean_name(name) {
            Ok(Some(name)) => name,
            Ok(None) => DEFAULT_GROUP_NAME.to_string(),
            Err(err) => return Err(err),
        };
        let mut ids = IdAllocator::new(groups);
        let mut next = groups.to_vec();
        next.push(Group::empty(ids.next_id(), name));
        Ok(next)
    }

    pub fn rename_group(&self, groups: &[Group], group_id: &GroupId, name: &str) -> EditResult {
        let Some(index) = position(groups, group_id) else {
            return self.reject(groups, EditError::UnknownGroup(group_id.clone()));
        };
        let Some(name) = self.clean_name(name)? else {
            return Ok(groups.to_vec());
        };
        let mut next = groups.to_vec();
        next[index].name = name;
        Ok(next)
    }

    /// Replace the selected groups with one new group holding their members,
    /// concatenated in `group_ids` order.
    pub fn merge_groups(&self, groups: &[Group], group_ids: &[GroupId], name: &str) -> EditResult {
        let requested: IndexSet<&GroupId> = group_ids.iter().collect();
        if let Some(unknown) = requested.iter().find(|id| position(groups, id).is_none()) {
            if self.policy == EditPolicy::Strict {
                return Err(EditError::UnknownGroup((*unknown).clone()));
            }
        }
        let selected: Vec<&Group> = requested
            .iter()
            .filter_map(|id| groups.iter().find(|g| g.group_id == **id))
            .collect();
        if selected.is_empty() || (self.policy == EditPolicy::Strict && selected.len() < 2) {
            return self.reject(
                groups,
                EditError::NotEnoughGroups {
                    found: selected.len(),
                },
            );
        }

        let name = match self.clean_name(name)? {
            Some(name) => name,
            None => selected[0].name.clone(),
        };
        let members: IndexSet<ExperimentId> = selected
            .iter()
            .flat_map(|g| g.experiment_ids.iter().cloned())
            .collect();
        let mut warnings = IndexSet::new();
        for group in &selected {
            warnings.extend(group.warnings.iter().cloned());
        }
        let merged = Group {
            group_id: IdAllocator::new(groups).next_id(),
            name,
            experiment_ids: members.into_iter().collect(),
            signature: common_signature(&selected),
            warnings: warnings.into_iter().collect(),
        };

        let mut next: Vec<Group> = groups
            .iter()
            .filter(|g| !requested.contains(&g.group_id))
            .cloned()
            .collect();
        next.push(merged);
        tracing::debug!(merged = selected.len(), "merged groups");
        Ok(next)
    }

    /// Replace a group with one new group per non-empty partition.
    ///
    /// Strict mode requires the partitions to cover the group exactly. Lenient
    /// mode drops IDs that are not members or that repeat, and leaves members
    /// not named by any partition ungrouped. Partitions left empty produce no
    /// group, and the remaining pieces are numbered `(1)`, `(2)`, ... in order.
    pub fn split_group(
        &self,
        groups: &[Group],
        group_id: &GroupId,
        partitions: &[Vec<ExperimentId>],
    ) -> EditResult {
        let Some(index) = position(groups, group_id) else {
            return self.reject(groups, EditError::UnknownGroup(group_id.clone()));
        };
        let original = &groups[index];
        if self.policy == EditPolicy::Strict {
            check_exact_cover(original, partitions)?;
        }

        let mut assigned: HashSet<&ExperimentId> = HashSet::new();
        let member_lists: Vec<Vec<ExperimentId>> = partitions
            .iter()
            .map(|partition| {
                partition
                    .iter()
                    .filter(|id| original.experiment_ids.contains(id) && assigned.insert(*id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|members| !members.is_empty())
            .collect();

        let mut ids = IdAllocator::new(groups);
        let pieces: Vec<Group> = member_lists
            .into_iter()
            .enumerate()
            .map(|(i, members)| Group {
                group_id: ids.next_id(),
                name: format!("{} ({})", original.name, i + 1),
                experiment_ids: members,
                signature: original.signature.clone(),
                warnings: Vec::new(),
            })
            .collect();

        let mut next: Vec<Group> = groups
            .iter()
            .filter(|g| g.group_id != *group_id)
            .cloned()
            .collect();
        next.extend(pieces);
        Ok(next)
    }

    fn reject(&self, groups: &[Group], error: EditError) -> EditResult {
        match self.policy {
            EditPolicy::Strict => Err(error),
            EditPolicy::Lenient => {
                tracing::debug!(%error, "ignored edit");
                Ok(groups.to_vec())
            }
        }
    }

    /// Trimmed name; blank names are an error in strict mode, `None` otherwise.
    fn clean_name(&self, name: &str) -> Result<Option<String>, EditError> {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
        match self.policy {
            EditPolicy::Strict => Err(EditError::EmptyName),
            EditPolicy::Lenient => Ok(None),
        }
    }
}

/// Check that group IDs are unique and no experiment is in two groups.
pub fn check_partition(groups: &[Group]) -> Result<(), EditError> {
    let mut group_ids = HashSet::with_capacity(groups.len());
    let mut owner: HashMap<&ExperimentId, &GroupId> = HashMap::new();
    for group in groups {
        if !group_ids.insert(&group.group_id) {
            return Err(EditError::DuplicateGroupId(group.group_id.clone()));
        }
        for experiment in &group.experiment_ids {
            if let Some(first) = owner.insert(experiment, &group.group_id) {
                return Err(EditError::DuplicateMembership {
                    experiment_id: experiment.clone(),
                    first: first.clone(),
                    second: group.group_id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn position(groups: &[Group], group_id: &GroupId) -> Option<usize> {
    groups.iter().position(|g| g.group_id == *group_id)
}

fn check_exact_cover(original: &Group, partitions: &[Vec<ExperimentId>]) -> Result<(), EditError> {
    let invalid = |reason: String| EditError::InvalidSplit {
        group_id: original.group_id.clone(),
        reason,
    };
    if partitions.is_empty() {
        return Err(invalid("no partitions given".to_string()));
    }
    let mut seen = HashSet::new();
    for id in partitions.iter().flatten() {
        if !original.experiment_ids.contains(id) {
            return Err(invalid(format!("{id} is not a member")));
        }
        if !seen.insert(id) {
            return Err(invalid(format!("{id} appears in more than one partition")));
        }
    }
    if seen.len() != original.experiment_ids.len() {
        return Err(invalid(format!(
            "partitions cover {} of {} members",
            seen.len(),
            original.experiment_ids.len()
        )));
    }
    Ok(())
}

/// Entries on which every merged group agrees.
fn common_signature(groups: &[&Group]) -> Signature {
    let Some((first, rest)) = groups.split_first() else {
        return Signature::new();
    };
    first
        .signature
        .iter()
        .filter(|(factor, value)| rest.iter().all(|g| g.signature.get(*factor) == Some(*value)))
        .map(|(factor, value)| (factor.clone(), value.clone()))
        .collect()
}

/// Hands out `manual-<n>` IDs not already used in the snapshot.
struct IdAllocator {
    taken: HashSet<String>,
    counter: usize,
}

impl IdAllocator {
    fn new(groups: &[Group]) -> Self {
        Self {
            taken: groups.iter().map(|g| g.group_id.to_string()).collect(),
            counter: 0,
        }
    }

    fn next_id(&mut self) -> GroupId {
        loop {
            self.counter += 1;
            let candidate = GroupId::manual(self.counter);
            if self.taken.insert(candidate.to_string()) {
                return candidate;
            }
        }
    }
}
