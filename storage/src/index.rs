//! In-memory skill-metadata index (spec §4.C). Guarded by a single mutex;
//! `list_skills` reads from here, `get_skill` loads from disk/cache.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::model::SkillMeta;

#[derive(Default)]
pub struct SkillIndex {
    entries: Mutex<HashMap<String, SkillMeta>>,
}

impl SkillIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, meta: SkillMeta) {
        self.entries.lock().insert(meta.id.clone(), meta);
    }

    pub fn remove(&self, id: &str) -> Option<SkillMeta> {
        self.entries.lock().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<SkillMeta> {
        self.entries.lock().get(id).cloned()
    }

    pub fn list(&self) -> Vec<SkillMeta> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
