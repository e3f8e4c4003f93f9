//! An unpersisted skill, ready to become version 1 (spec §3 "Draft").

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use skillflow_storage::model::SkillGraph;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillDraft {
    pub graph: SkillGraph,
    pub inputs_schema: Value,
    pub output_schema: Value,
    pub metadata: HashMap<String, Value>,
}
