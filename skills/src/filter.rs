//! Combined skill-listing filters (spec §4.E `list_skills`). All supplied
//! filters AND together.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use skillflow_storage::model::SkillMeta;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillFilter {
    /// Case-insensitive substring match against name OR description.
    pub text: Option<String>,
    /// Skill must carry every one of these tags.
    pub tags: Vec<String>,
    /// Matches `author.workspace_id` or `author.client_id`.
    pub author_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// SPEC_FULL §4.E addition: substring match on `compatibility`
    /// metadata.
    pub compatibility: Option<String>,
}

impl SkillFilter {
    pub fn matches(&self, meta: &SkillMeta) -> bool {
        if let Some(text) = &self.text {
            let text = text.to_lowercase();
            let name_hit = meta.name.to_lowercase().contains(&text);
            let desc_hit = meta.description.to_lowercase().contains(&text);
            if !name_hit && !desc_hit {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let has_all = self.tags.iter().all(|t| meta.tags.contains(t));
            if !has_all {
                return false;
            }
        }
        if let Some(author_id) = &self.author_id {
            if &meta.author.workspace_id != author_id && &meta.author.client_id != author_id {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if meta.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if meta.created_at > before {
                return false;
            }
        }
        if let Some(compat) = &self.compatibility {
            let matches = meta
                .metadata
                .get("compatibility")
                .and_then(|v| v.as_str())
                .map(|s| s.to_lowercase().contains(&compat.to_lowercase()))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        true
    }
}
