//! 内存对象存储
//!
//! 按模型保存记录，维护外键与多对多关系索引，并把模型和关系注册为
//! 查询引擎使用的对象提供者与关系提供者。

use super::filter::FilterChain;
use super::index::LinkIndex;
use super::record::Record;
use crate::catalog::{Catalog, RelationKind};
use crate::error::{Error, Result};
use crate::provider::{Edge, ObjectProvider, RelationProvider};
use crate::query::FilterOp;
use crate::types::ObjectId;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 模型表
pub(crate) struct Table {
    /// 应用名
    pub app: String,
    /// 模型名
    pub name: String,
    /// 记录（按插入顺序）
    pub records: IndexMap<ObjectId, Record>,
    /// 已知字段名
    columns: HashSet<String>,
}

impl Table {
    pub(crate) fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }
}

/// 存储中的一条关系（正向或反向）
pub(crate) struct StoredRelation {
    /// 关系名
    pub name: String,
    /// 目标模型全名
    pub target: String,
    pub kind: RelationKind,
    /// 外键列名（仅正向外键）
    pub column: Option<String>,
    links: Arc<LinkIndex>,
    reverse: bool,
    symmetric: bool,
}

impl StoredRelation {
    /// 通过该关系可达的对象
    pub(crate) fn related(&self, id: ObjectId) -> Vec<ObjectId> {
        if self.symmetric {
            let mut all: IndexSet<ObjectId> = self.links.targets(id).into_iter().collect();
            all.extend(self.links.sources(id));
            return all.into_iter().collect();
        }
        if self.reverse {
            self.links.sources(id)
        } else {
            self.links.targets(id)
        }
    }
}

/// 存储状态
#[derive(Default)]
pub(crate) struct StoreState {
    tables: IndexMap<String, Table>,
    /// (模型全名, 关系名) -> 关系
    relations: IndexMap<(String, String), StoredRelation>,
}

impl StoreState {
    pub(crate) fn table(&self, model: &str) -> Option<&Table> {
        self.tables.get(model)
    }

    pub(crate) fn relation(&self, model: &str, name: &str) -> Option<&StoredRelation> {
        self.relations.get(&(model.to_string(), name.to_string()))
    }

    /// 全名或唯一短名 -> 全名
    fn resolve(&self, model: &str) -> Result<String> {
        if self.tables.contains_key(model) {
            return Ok(model.to_string());
        }
        let candidates: Vec<String> = self
            .tables
            .values()
            .filter(|t| t.name == model)
            .map(|t| full_name(&t.app, &t.name))
            .collect();
        match candidates.len() {
            0 => Err(Error::UnknownModel(model.to_string())),
            1 => Ok(candidates.into_iter().next().unwrap_or_default()),
            _ => Err(Error::AmbiguousName {
                name: model.to_string(),
                candidates,
            }),
        }
    }

    fn stored_relation(&self, model: &str, name: &str) -> Result<&StoredRelation> {
        self.relation(model, name).ok_or_else(|| Error::UnknownRelation {
            model: model.to_string(),
            relation: name.to_string(),
        })
    }

    fn add_relation(&mut self, model: &str, relation: StoredRelation) -> Result<()> {
        let key = (model.to_string(), relation.name.clone());
        if self.relations.contains_key(&key) {
            return Err(Error::Config(format!(
                "relation {}.{} defined twice",
                model, relation.name
            )));
        }
        self.relations.insert(key, relation);
        Ok(())
    }

    fn ids(&self, model: &str) -> Vec<ObjectId> {
        self.tables
            .get(model)
            .map(|t| t.records.keys().copied().collect())
            .unwrap_or_default()
    }
}

fn full_name(app: &str, name: &str) -> String {
    format!("{}__{}", app, name)
}

/// Django 风格的默认反向关系名：`entry_set`
fn default_related_name(model: &str) -> String {
    let short = model.rsplit("__").next().unwrap_or(model);
    format!("{}_set", short.to_lowercase())
}

/// 内存对象存储
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ==================== 模型定义 ====================

    /// 定义模型，返回全名 `app__Name`
    pub fn define_model(&self, app: &str, name: &str) -> Result<String> {
        let full = full_name(app, name);
        let mut state = self.state.write();
        if state.tables.contains_key(&full) {
            return Err(Error::Config(format!("model {} defined twice", full)));
        }
        state.tables.insert(
            full.clone(),
            Table {
                app: app.to_string(),
                name: name.to_string(),
                records: IndexMap::new(),
                columns: HashSet::new(),
            },
        );
        Ok(full)
    }

    /// 定义外键 `model.field -> target`，列名为 `{field}_id`；
    /// 反向关系名默认为 `{model}_set`
    pub fn foreign_key(&self, model: &str, field: &str, target: &str, related_name: Option<&str>) -> Result<()> {
        let mut state = self.state.write();
        let model = state.resolve(model)?;
        let target = state.resolve(target)?;
        let column = format!("{}_id", field);
        let links = Arc::new(LinkIndex::new());

        state.add_relation(
            &model,
            StoredRelation {
                name: field.to_string(),
                target: target.clone(),
                kind: RelationKind::ToOne,
                column: Some(column.clone()),
                links: Arc::clone(&links),
                reverse: false,
                symmetric: false,
            },
        )?;
        let reverse_name = related_name
            .map(str::to_string)
            .unwrap_or_else(|| default_related_name(&model));
        state.add_relation(
            &target,
            StoredRelation {
                name: reverse_name,
                target: model.clone(),
                kind: RelationKind::ToMany,
                column: None,
                links,
                reverse: true,
                symmetric: false,
            },
        )?;

        if let Some(table) = state.tables.get_mut(&model) {
            table.columns.insert(column);
        }
        Ok(())
    }

    /// 定义多对多关系；对称关系只能指向自身且没有反向名
    pub fn many_to_many(
        &self,
        model: &str,
        name: &str,
        target: &str,
        related_name: Option<&str>,
        symmetric: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let model = state.resolve(model)?;
        let target = state.resolve(target)?;
        if symmetric && model != target {
            return Err(Error::Config(format!(
                "symmetric relation {}.{} must point to its own model",
                model, name
            )));
        }
        let links = Arc::new(LinkIndex::new());

        state.add_relation(
            &model,
            StoredRelation {
                name: name.to_string(),
                target: target.clone(),
                kind: RelationKind::ManyToMany,
                column: None,
                links: Arc::clone(&links),
                reverse: false,
                symmetric,
            },
        )?;
        if !symmetric {
            let reverse_name = related_name
                .map(str::to_string)
                .unwrap_or_else(|| default_related_name(&model));
            state.add_relation(
                &target,
                StoredRelation {
                    name: reverse_name,
                    target: model,
                    kind: RelationKind::ManyToMany,
                    column: None,
                    links,
                    reverse: true,
                    symmetric: false,
                },
            )?;
        }
        Ok(())
    }

    // ==================== 记录操作 ====================

    /// 插入或替换记录；外键列会同步到关系索引
    pub fn insert(&self, model: &str, record: Record) -> Result<ObjectId> {
        let mut state = self.state.write();
        let model = state.resolve(model)?;
        let id = record.id;

        for ((owner, _), rel) in state.relations.iter() {
            if *owner != model || rel.reverse {
                continue;
            }
            if let Some(column) = &rel.column {
                rel.links.unlink_from(id);
                if let Some(target) = record.reference(column) {
                    rel.links.link(id, target);
                }
            }
        }

        if let Some(table) = state.tables.get_mut(&model) {
            table.columns.extend(record.fields.keys().cloned());
            table.records.insert(id, record);
        }
        Ok(id)
    }

    /// 为多对多关系添加链接；使用反向名时方向随之反转
    pub fn link(&self, model: &str, relation: &str, from: ObjectId, to: ObjectId) -> Result<()> {
        let state = self.state.read();
        let model = state.resolve(model)?;
        let rel = state.stored_relation(&model, relation)?;
        if rel.kind != RelationKind::ManyToMany {
            return Err(Error::Config(format!(
                "{}.{} is a {} relation; set its foreign key column instead",
                model, relation, rel.kind
            )));
        }
        if rel.reverse {
            rel.links.link(to, from);
        } else {
            rel.links.link(from, to);
        }
        Ok(())
    }

    /// 获取记录
    pub fn get(&self, model: &str, id: ObjectId) -> Option<Record> {
        let state = self.state.read();
        let model = state.resolve(model).ok()?;
        state.tables.get(&model)?.records.get(&id).cloned()
    }

    /// 模型全名列表
    pub fn models(&self) -> Vec<String> {
        self.state.read().tables.keys().cloned().collect()
    }

    /// 模型的记录数
    pub fn count(&self, model: &str) -> usize {
        let state = self.state.read();
        state
            .resolve(model)
            .map(|m| state.ids(&m).len())
            .unwrap_or(0)
    }

    // ==================== 查询 ====================

    /// 模型中通过过滤链的全部对象
    pub fn objects(&self, model: &str, filters: &[FilterOp]) -> Result<Vec<ObjectId>> {
        let state = self.state.read();
        let model = state.resolve(model)?;
        let ids = state.ids(&model);
        FilterChain::new(&state, &model).apply(ids, filters)
    }

    /// `ids` 中通过过滤链的对象
    pub fn select(&self, model: &str, ids: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<ObjectId>> {
        let state = self.state.read();
        let model = state.resolve(model)?;
        let table = state
            .table(&model)
            .ok_or_else(|| Error::UnknownModel(model.clone()))?;
        let existing: Vec<ObjectId> = ids
            .iter()
            .copied()
            .filter(|id| table.records.contains_key(id))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        FilterChain::new(&state, &model).apply(existing, filters)
    }

    /// 一次批量获取 `sources` 经 `relation` 可达的对象，
    /// 过滤链作用于全部目标对象
    pub fn related(
        &self,
        model: &str,
        relation: &str,
        sources: &[ObjectId],
        filters: &[FilterOp],
    ) -> Result<Vec<Edge>> {
        let state = self.state.read();
        let model = state.resolve(model)?;
        let rel = state.stored_relation(&model, relation)?;

        // target -> sources reaching it
        let mut by_target: IndexMap<ObjectId, IndexSet<ObjectId>> = IndexMap::new();
        for source in sources {
            for target in rel.related(*source) {
                by_target.entry(target).or_default().insert(*source);
            }
        }
        let targets: Vec<ObjectId> = by_target.keys().copied().collect();
        let kept = FilterChain::new(&state, &rel.target).apply(targets, filters)?;

        let mut result = Vec::new();
        for target in kept {
            if let Some(from) = by_target.get(&target) {
                result.extend(from.iter().map(|source| (target, *source)));
            }
        }
        debug!(
            model = %model,
            relation,
            sources = sources.len(),
            edges = result.len(),
            "store relation fetch"
        );
        Ok(result)
    }

    // ==================== 目录 ====================

    /// 把全部模型和关系注册到新的目录
    pub fn catalog(self: &Arc<Self>) -> Result<Catalog> {
        let state = self.state.read();
        let mut catalog = Catalog::new();
        for model in state.tables.keys() {
            catalog.register_model(
                model,
                Arc::new(StoreObjects {
                    store: Arc::clone(self),
                    model: model.clone(),
                }),
            )?;
        }
        for ((model, name), rel) in state.relations.iter() {
            catalog.register_relation(
                model,
                name,
                &rel.target,
                rel.kind,
                Arc::new(StoreRelation {
                    store: Arc::clone(self),
                    model: model.clone(),
                    relation: name.clone(),
                }),
            )?;
        }
        Ok(catalog)
    }
}

/// 模型的对象提供者
struct StoreObjects {
    store: Arc<MemoryStore>,
    model: String,
}

impl ObjectProvider for StoreObjects {
    fn objects(&self, filters: &[FilterOp]) -> Result<Vec<ObjectId>> {
        self.store.objects(&self.model, filters)
    }

    fn select(&self, ids: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<ObjectId>> {
        self.store.select(&self.model, ids, filters)
    }
}

/// 关系的提供者
struct StoreRelation {
    store: Arc<MemoryStore>,
    model: String,
    relation: String,
}

impl RelationProvider for StoreRelation {
    fn fetch(&self, sources: &[ObjectId], filters: &[FilterOp]) -> Result<Vec<Edge>> {
        self.store.related(&self.model, &self.relation, sources, filters)
    }
}
