//! Per-agent configuration: personality, models, goals, tool allowlist,
//! and the think-loop interval.
//!
//! Configs are patched with a JSON deep merge: unspecified fields are
//! preserved, `loopIntervalMs` is clamped on every write.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lexicon::Issue;

/// Hard floor for the think-loop interval.  Writes below this are clamped,
/// not rejected.
pub const MIN_LOOP_INTERVAL_MS: u64 = 5_000;

/// Default think-loop interval.
pub const DEFAULT_LOOP_INTERVAL_MS: u64 = 60_000;

/// Maximum agent name length.
pub const MAX_NAME_LEN: usize = 40;

/// Profile field caps: status / currentFocus / mood.
pub const PROFILE_STATUS_MAX: usize = 100;
pub const PROFILE_FOCUS_MAX: usize = 200;
pub const PROFILE_MOOD_MAX: usize = 50;

fn d_model() -> String {
    "moonshotai/kimi-k2.5".into()
}

fn d_fast_model() -> String {
    "google/gemini-2.0-flash-001".into()
}

fn d_loop_interval() -> u64 {
    DEFAULT_LOOP_INTERVAL_MS
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub personality: String,
    /// May be empty.
    #[serde(default)]
    pub specialty: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_fast_model")]
    pub fast_model: String,
    #[serde(default = "d_loop_interval")]
    pub loop_interval_ms: u64,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub enabled_tools: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// An ordered goal tracked in the agent's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub status: GoalStatus,
    /// Fraction complete in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Pending,
    Active,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

/// Free-form presence fields, length-capped on every write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_focus: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Profile {
    /// Enforce the per-field length caps in place.
    pub fn truncate(&mut self) {
        truncate_opt(&mut self.status, PROFILE_STATUS_MAX);
        truncate_opt(&mut self.current_focus, PROFILE_FOCUS_MAX);
        truncate_opt(&mut self.mood, PROFILE_MOOD_MAX);
    }
}

fn truncate_opt(field: &mut Option<String>, max: usize) {
    if let Some(s) = field {
        if s.chars().count() > max {
            *s = s.chars().take(max).collect();
        }
    }
}

impl AgentConfig {
    /// A fresh config with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            personality: String::new(),
            specialty: String::new(),
            model: d_model(),
            fast_model: d_fast_model(),
            loop_interval_ms: DEFAULT_LOOP_INTERVAL_MS,
            goals: Vec::new(),
            enabled_tools: BTreeSet::new(),
            profile: None,
        }
    }

    /// Validate a config that arrived over the wire.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        if self.name.is_empty() || self.name.chars().count() > MAX_NAME_LEN {
            issues.push(Issue::new(
                "name",
                format!("must be 1..{MAX_NAME_LEN} characters"),
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            issues.push(Issue::new(
                "name",
                "may only contain ASCII letters, digits, '-' and '_'",
            ));
        }
        for (i, goal) in self.goals.iter().enumerate() {
            if !(0.0..=1.0).contains(&goal.progress) {
                issues.push(Issue::new(
                    format!("goals/{i}/progress"),
                    "must be within [0, 1]",
                ));
            }
            if goal.description.is_empty() {
                issues.push(Issue::new(
                    format!("goals/{i}/description"),
                    "must not be empty",
                ));
            }
        }
        issues
    }

    /// Clamp fields that are normalized rather than rejected.
    pub fn clamp(&mut self) {
        if self.loop_interval_ms < MIN_LOOP_INTERVAL_MS {
            self.loop_interval_ms = MIN_LOOP_INTERVAL_MS;
        }
        if let Some(p) = &mut self.profile {
            p.truncate();
        }
    }

    /// Apply a JSON merge-patch and return the patched config.
    ///
    /// Objects merge recursively, arrays and scalars replace, `null` deletes.
    /// `name` is immutable; a differing name in the patch is a validation
    /// error rather than a rename.
    pub fn merge_patch(&self, patch: &Value) -> Result<AgentConfig, Vec<Issue>> {
        if !patch.is_object() {
            return Err(vec![Issue::new("", "config patch must be a JSON object")]);
        }
        if let Some(patched_name) = patch.get("name").and_then(Value::as_str) {
            if !patched_name.eq_ignore_ascii_case(&self.name) {
                return Err(vec![Issue::new("name", "agent name cannot be changed")]);
            }
        }

        let mut merged = serde_json::to_value(self).map_err(|e| {
            vec![Issue::new("", format!("config serialization failed: {e}"))]
        })?;
        deep_merge(&mut merged, patch);

        let mut next: AgentConfig = serde_json::from_value(merged)
            .map_err(|e| vec![Issue::new("", format!("invalid config: {e}"))])?;
        next.name = self.name.clone();
        next.clamp();

        let issues = next.validate();
        if issues.is_empty() {
            Ok(next)
        } else {
            Err(issues)
        }
    }
}

/// Recursive JSON merge: objects merge key-wise, `null` removes, everything
/// else replaces.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_val) in patch_map {
                if patch_val.is_null() {
                    base_map.remove(key);
                } else if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, patch_val);
                } else {
                    base_map.insert(key.clone(), patch_val.clone());
                }
            }
        }
        (base_slot, patch_val) => {
            *base_slot = patch_val.clone();
        }
    }
}
