//! Stateless façade over storage (spec §4.E).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use skillflow_storage::model::{Author, Skill, SkillGraph, SkillMeta};
use skillflow_storage::Storage;

use crate::draft::SkillDraft;
use crate::error::SkillsResult;
use crate::filter::SkillFilter;

pub struct SkillManager {
    storage: Arc<Storage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub inputs_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub graph: Option<SkillGraph>,
    pub metadata: Option<HashMap<String, Value>>,
}

impl SkillManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Writes `v0001.json` and `meta.json`; propagates
    /// `draft.metadata["source_session_id"]` through unchanged.
    pub async fn create_skill(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        author: Author,
        draft: SkillDraft,
    ) -> SkillsResult<Skill> {
        let now = Utc::now();
        let skill = Skill {
            id: id.into(),
            name: name.into(),
            version: 1,
            description: description.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            author,
            inputs_schema: draft.inputs_schema,
            output_schema: draft.output_schema,
            graph: draft.graph,
            metadata: draft.metadata,
        };
        self.storage.save_skill(&skill).await?;
        Ok(skill)
    }

    /// Loads the current latest version, produces `version + 1` with
    /// updated fields and timestamp, writes it. Earlier versions remain
    /// on disk untouched.
    pub async fn update_skill(&self, id: &str, update: SkillUpdate) -> SkillsResult<Skill> {
        let current = self.storage.load_skill(id, None).await?;
        let mut next = (*current).clone();
        next.version += 1;
        next.updated_at = Utc::now();
        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(description) = update.description {
            next.description = description;
        }
        if let Some(tags) = update.tags {
            next.tags = tags;
        }
        if let Some(inputs_schema) = update.inputs_schema {
            next.inputs_schema = inputs_schema;
        }
        if let Some(output_schema) = update.output_schema {
            next.output_schema = output_schema;
        }
        if let Some(graph) = update.graph {
            next.graph = graph;
        }
        if let Some(metadata) = update.metadata {
            next.metadata = metadata;
        }
        self.storage.save_skill(&next).await?;
        Ok(next)
    }

    pub async fn delete_skill(&self, id: &str, hard: bool) -> SkillsResult<()> {
        self.storage.delete_skill(id, hard).await?;
        Ok(())
    }

    pub async fn get_skill(&self, id: &str, version: Option<u32>) -> SkillsResult<Arc<Skill>> {
        Ok(self.storage.load_skill(id, version).await?)
    }

    pub fn list_skills(&self, filter: &SkillFilter) -> Vec<SkillMeta> {
        self.storage
            .list_skill_metas()
            .into_iter()
            .filter(|meta| filter.matches(meta))
            .collect()
    }

    /// `{name: "skill__<id>", description, inputSchema: skill.inputs_schema}`
    pub fn export_as_tool_descriptor(skill: &Skill) -> Value {
        serde_json::json!({
            "name": format!("skill__{}", skill.id),
            "description": skill.description,
            "inputSchema": skill.inputs_schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillflow_storage::model::SkillGraph;

    async fn manager() -> (tempfile::TempDir, SkillManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(skillflow_storage::Storage::open(dir.path()).await.unwrap());
        (dir, SkillManager::new(storage))
    }

    fn author() -> Author {
        Author {
            workspace_id: "ws".into(),
            client_id: "cli".into(),
        }
    }

    #[tokio::test]
    async fn create_then_update_bumps_version() {
        let (_dir, mgr) = manager().await;
        let draft = SkillDraft {
            graph: SkillGraph::default(),
            inputs_schema: serde_json::json!({"type": "object"}),
            output_schema: serde_json::json!({"type": "object"}),
            metadata: HashMap::new(),
        };
        let created = mgr
            .create_skill("sk1", "Sample", "desc", author(), draft)
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let updated = mgr
            .update_skill(
                "sk1",
                SkillUpdate {
                    description: Some("new desc".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.description, "new desc");
    }

    #[tokio::test]
    async fn list_skills_filters_by_tag_and_text() {
        let (_dir, mgr) = manager().await;
        let draft = SkillDraft {
            graph: SkillGraph::default(),
            inputs_schema: Value::Null,
            output_schema: Value::Null,
            metadata: HashMap::new(),
        };
        mgr.create_skill("sk1", "Deploy App", "deploys stuff", author(), draft.clone())
            .await
            .unwrap();
        mgr.update_skill(
            "sk1",
            SkillUpdate {
                tags: Some(vec!["ops".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let hits = mgr.list_skills(&SkillFilter {
            text: Some("deploy".into()),
            tags: vec!["ops".into()],
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);

        let misses = mgr.list_skills(&SkillFilter {
            tags: vec!["nonexistent".into()],
            ..Default::default()
        });
        assert!(misses.is_empty());
    }
}
