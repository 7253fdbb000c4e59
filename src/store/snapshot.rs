//! JSON 快照导入
//!
//! 快照描述模型、记录、外键和多对多链接，CLI 启动时从文件加载。

use super::memory::MemoryStore;
use super::record::Record;
use crate::error::{Error, Result};
use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 存储快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub models: Vec<ModelSnapshot>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,
    #[serde(default)]
    pub many_to_many: Vec<ManyToManySpec>,
}

/// 模型及其记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub app: String,
    pub name: String,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// 外键定义；记录通过 `{field}_id` 列引用目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub model: String,
    pub field: String,
    pub target: String,
    #[serde(default)]
    pub related_name: Option<String>,
}

/// 多对多定义及链接 `[from, to]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManyToManySpec {
    pub model: String,
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub related_name: Option<String>,
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default)]
    pub links: Vec<(ObjectId, ObjectId)>,
}

impl MemoryStore {
    /// 从快照构建存储
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Arc<Self>> {
        let store = MemoryStore::new();
        for model in &snapshot.models {
            store.define_model(&model.app, &model.name)?;
        }
        for fk in &snapshot.foreign_keys {
            store.foreign_key(&fk.model, &fk.field, &fk.target, fk.related_name.as_deref())?;
        }
        for m2m in &snapshot.many_to_many {
            store.many_to_many(
                &m2m.model,
                &m2m.name,
                &m2m.target,
                m2m.related_name.as_deref(),
                m2m.symmetric,
            )?;
        }

        let mut records = 0;
        for model in &snapshot.models {
            let full = format!("{}__{}", model.app, model.name);
            for record in &model.records {
                store.insert(&full, record.clone())?;
                records += 1;
            }
        }
        let mut links = 0;
        for m2m in &snapshot.many_to_many {
            for (from, to) in &m2m.links {
                store.link(&m2m.model, &m2m.name, *from, *to)?;
                links += 1;
            }
        }

        info!(
            models = snapshot.models.len(),
            records,
            links,
            "loaded store snapshot"
        );
        Ok(store)
    }

    /// 从 JSON 文件加载快照
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&text).map_err(|e| {
            Error::Serialization(format!("invalid snapshot {}: {}", path.display(), e))
        })?;
        Self::from_snapshot(&snapshot)
    }
}
