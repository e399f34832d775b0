//! The test map: the hierarchical part → section → item structure a session
//! navigates, with per-scope time limits and navigation modes.
//!
//! The map is produced by a collaborator (authoring/compilation is out of
//! scope); this module loads it from TOML, validates it, and answers the
//! positional queries the evaluator, the controller, and the offline
//! navigator need.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tags::{Scope, Tag, TagSet};

/// Test-part navigation behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    #[default]
    Linear,
    NonLinear,
}

/// Direction of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationDirection {
    Next,
    Previous,
    Jump,
}

/// Configured timing bounds for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    /// Minimum time that must be spent before leaving, in milliseconds.
    #[serde(default)]
    pub min_time_ms: Option<u64>,
    /// Maximum time allowed, in milliseconds.
    #[serde(default)]
    pub max_time_ms: Option<u64>,
    /// Whether a response arriving after max time is still accepted.
    #[serde(default)]
    pub allow_late_submission: bool,
}

impl TimeLimits {
    pub fn is_empty(&self) -> bool {
        self.min_time_ms.is_none() && self.max_time_ms.is_none()
    }
}

/// A single deliverable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: Tag,
    #[serde(default)]
    pub label: String,
    /// Category metadata (informational, adaptive, ...).
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub time_limits: Option<TimeLimits>,
    /// Whether an empty response is accepted when moving on.
    #[serde(default = "default_true")]
    pub allow_skipping: bool,
}

/// A section groups items and may carry its own time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDef {
    pub id: Tag,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub time_limits: Option<TimeLimits>,
    #[serde(default)]
    pub items: Vec<ItemDef>,
}

/// A test part fixes the navigation mode for its sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartDef {
    pub id: Tag,
    #[serde(default)]
    pub navigation_mode: NavigationMode,
    #[serde(default)]
    pub time_limits: Option<TimeLimits>,
    #[serde(default)]
    pub sections: Vec<SectionDef>,
}

fn default_true() -> bool {
    true
}

/// The full test structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMap {
    pub id: Tag,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub time_limits: Option<TimeLimits>,
    /// Global extra-time allowance granted for this sitting.
    #[serde(default)]
    pub extra_time_ms: u64,
    #[serde(default)]
    pub parts: Vec<PartDef>,
}

/// A resolved flat position: which item, inside which section and part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub position: usize,
    pub item: Tag,
    pub section: Tag,
    pub part: Tag,
}

impl TestMap {
    /// Parse a map from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse test map TOML")
    }

    /// Load a map from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read test map: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse test map: {}", path.display()))
    }

    /// Flattened item positions in delivery order.
    pub fn entries(&self) -> Vec<MapEntry> {
        let mut entries = Vec::new();
        for part in &self.parts {
            for section in &part.sections {
                for item in &section.items {
                    entries.push(MapEntry {
                        position: entries.len(),
                        item: item.id.clone(),
                        section: section.id.clone(),
                        part: part.id.clone(),
                    });
                }
            }
        }
        entries
    }

    pub fn item_count(&self) -> usize {
        self.parts
            .iter()
            .flat_map(|p| &p.sections)
            .map(|s| s.items.len())
            .sum()
    }

    pub fn entry_at(&self, position: usize) -> Option<MapEntry> {
        self.entries().into_iter().nth(position)
    }

    pub fn position_of(&self, item: &Tag) -> Option<usize> {
        self.entries().into_iter().find(|e| &e.item == item).map(|e| e.position)
    }

    pub fn is_last_position(&self, position: usize) -> bool {
        position + 1 >= self.item_count()
    }

    /// The timer tags for the item at `position`: the item itself plus every
    /// enclosing scope, so one ledger range counts toward all of them.
    pub fn tags_at(&self, position: usize) -> Option<TagSet> {
        let entry = self.entry_at(position)?;
        let mut tags = TagSet::new();
        tags.insert(entry.item.clone());
        tags.insert(entry.section.clone());
        tags.insert(entry.part.clone());
        tags.insert(self.id.clone());
        Some(tags)
    }

    pub fn item_def(&self, item: &Tag) -> Option<&ItemDef> {
        self.parts
            .iter()
            .flat_map(|p| &p.sections)
            .flat_map(|s| &s.items)
            .find(|i| &i.id == item)
    }

    pub fn section_def(&self, section: &Tag) -> Option<&SectionDef> {
        self.parts
            .iter()
            .flat_map(|p| &p.sections)
            .find(|s| &s.id == section)
    }

    pub fn part_def(&self, part: &Tag) -> Option<&PartDef> {
        self.parts.iter().find(|p| &p.id == part)
    }

    /// Navigation mode of the part containing `position`.
    pub fn navigation_mode_at(&self, position: usize) -> NavigationMode {
        self.entry_at(position)
            .and_then(|e| self.part_def(&e.part))
            .map(|p| p.navigation_mode)
            .unwrap_or_default()
    }

    /// Configured time limits for one scope at a position.
    pub fn limits_for(&self, scope: Scope, position: usize) -> Option<TimeLimits> {
        let entry = self.entry_at(position)?;
        let limits = match scope {
            Scope::Item => self.item_def(&entry.item)?.time_limits,
            Scope::Section => self.section_def(&entry.section)?.time_limits,
            Scope::TestPart => self.part_def(&entry.part)?.time_limits,
            Scope::Test => self.time_limits,
        };
        limits.filter(|l| !l.is_empty())
    }

    /// Resolve a navigation request to a target position.
    ///
    /// Scope `Item` steps between items; `Section`/`TestPart` step to the
    /// first item of the adjacent section/part. Returns `None` when the move
    /// leaves the test (e.g. `Next` past the last item).
    pub fn target_position(
        &self,
        from: usize,
        direction: NavigationDirection,
        scope: Scope,
        explicit: Option<usize>,
    ) -> Option<usize> {
        let entries = self.entries();
        let current = entries.get(from)?;

        match (direction, scope) {
            (NavigationDirection::Jump, _) => {
                explicit.filter(|&p| p < entries.len())
            }
            (NavigationDirection::Next, Scope::Item) => {
                entries.get(from + 1).map(|e| e.position)
            }
            (NavigationDirection::Previous, Scope::Item) => {
                from.checked_sub(1)
            }
            (NavigationDirection::Next, Scope::Section) => entries
                .iter()
                .skip(from + 1)
                .find(|e| e.section != current.section)
                .map(|e| e.position),
            (NavigationDirection::Previous, Scope::Section) => {
                let prev_section = entries[..from]
                    .iter()
                    .rev()
                    .find(|e| e.section != current.section)?
                    .section
                    .clone();
                entries.iter().find(|e| e.section == prev_section).map(|e| e.position)
            }
            (NavigationDirection::Next, Scope::TestPart) => entries
                .iter()
                .skip(from + 1)
                .find(|e| e.part != current.part)
                .map(|e| e.position),
            (NavigationDirection::Previous, Scope::TestPart) => {
                let prev_part = entries[..from]
                    .iter()
                    .rev()
                    .find(|e| e.part != current.part)?
                    .part
                    .clone();
                entries.iter().find(|e| e.part == prev_part).map(|e| e.position)
            }
            (_, Scope::Test) => None,
        }
    }

    /// Validate the map for common authoring issues.
    pub fn validate(&self) -> Vec<MapWarning> {
        let mut warnings = Vec::new();

        if self.parts.is_empty() {
            warnings.push(MapWarning {
                source: Some(self.id.clone()),
                message: "test map has no parts".into(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for entry in self.entries() {
            if !seen.insert(entry.item.clone()) {
                warnings.push(MapWarning {
                    source: Some(entry.item.clone()),
                    message: format!("duplicate item identifier: {}", entry.item),
                });
            }
        }

        for part in &self.parts {
            if part.sections.iter().all(|s| s.items.is_empty()) {
                warnings.push(MapWarning {
                    source: Some(part.id.clone()),
                    message: format!("part '{}' contains no items", part.id),
                });
            }
        }

        // min > max is a configuration the evaluator can never satisfy.
        let mut all_limits: Vec<(&Tag, &TimeLimits)> = Vec::new();
        if let Some(l) = &self.time_limits {
            all_limits.push((&self.id, l));
        }
        for part in &self.parts {
            if let Some(l) = &part.time_limits {
                all_limits.push((&part.id, l));
            }
            for section in &part.sections {
                if let Some(l) = &section.time_limits {
                    all_limits.push((&section.id, l));
                }
                for item in &section.items {
                    if let Some(l) = &item.time_limits {
                        all_limits.push((&item.id, l));
                    }
                }
            }
        }
        for (source, limits) in all_limits {
            if let (Some(min), Some(max)) = (limits.min_time_ms, limits.max_time_ms) {
                if min > max {
                    warnings.push(MapWarning {
                        source: Some(source.clone()),
                        message: format!("min_time_ms ({min}) exceeds max_time_ms ({max})"),
                    });
                }
            }
        }

        warnings
    }
}

/// A warning from test map validation.
#[derive(Debug, Clone)]
pub struct MapWarning {
    /// The offending entity, if attributable.
    pub source: Option<Tag>,
    pub message: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Two parts; part one linear with two sections, part two non-linear.
    pub fn two_part_map() -> TestMap {
        TestMap {
            id: Tag::new("test-x"),
            label: "Fixture test".into(),
            time_limits: Some(TimeLimits {
                min_time_ms: None,
                max_time_ms: Some(3_600_000),
                allow_late_submission: false,
            }),
            extra_time_ms: 10_000,
            parts: vec![
                PartDef {
                    id: Tag::new("part-1"),
                    navigation_mode: NavigationMode::Linear,
                    time_limits: None,
                    sections: vec![
                        SectionDef {
                            id: Tag::new("section-A"),
                            label: "Section A".into(),
                            time_limits: Some(TimeLimits {
                                min_time_ms: None,
                                max_time_ms: Some(600_000),
                                allow_late_submission: false,
                            }),
                            items: vec![
                                ItemDef {
                                    id: Tag::new("item-1"),
                                    label: "Item 1".into(),
                                    categories: vec![],
                                    time_limits: Some(TimeLimits {
                                        min_time_ms: Some(5_000),
                                        max_time_ms: Some(90_000),
                                        allow_late_submission: false,
                                    }),
                                    allow_skipping: true,
                                },
                                ItemDef {
                                    id: Tag::new("item-2"),
                                    label: "Item 2".into(),
                                    categories: vec![],
                                    time_limits: None,
                                    allow_skipping: false,
                                },
                            ],
                        },
                        SectionDef {
                            id: Tag::new("section-B"),
                            label: "Section B".into(),
                            time_limits: None,
                            items: vec![ItemDef {
                                id: Tag::new("item-3"),
                                label: "Item 3".into(),
                                categories: vec!["informational".into()],
                                time_limits: None,
                                allow_skipping: true,
                            }],
                        },
                    ],
                },
                PartDef {
                    id: Tag::new("part-2"),
                    navigation_mode: NavigationMode::NonLinear,
                    time_limits: None,
                    sections: vec![SectionDef {
                        id: Tag::new("section-C"),
                        label: "Section C".into(),
                        time_limits: None,
                        items: vec![ItemDef {
                            id: Tag::new("item-4"),
                            label: "Item 4".into(),
                            categories: vec![],
                            time_limits: None,
                            allow_skipping: true,
                        }],
                    }],
                },
            ],
        }
    }
}
