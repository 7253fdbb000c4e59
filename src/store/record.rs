//! 记录定义

use crate::types::{ObjectId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 模型中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 记录 ID（模型内唯一）
    pub id: ObjectId,
    /// 字段值，保持插入顺序
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl Record {
    /// 创建空记录
    pub fn new(id: impl Into<ObjectId>) -> Self {
        Self {
            id: id.into(),
            fields: IndexMap::new(),
        }
    }

    /// 设置字段（构建器）
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// 设置字段
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// 获取字段
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 外键列中保存的目标 ID
    pub fn reference(&self, column: &str) -> Option<ObjectId> {
        self.get(column)
            .and_then(Value::as_i64)
            .and_then(|id| u64::try_from(id).ok())
            .map(ObjectId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields() {
        let record = Record::new(3u64)
            .with("headline", "Hello")
            .with("blog_id", 1)
            .with("in_reply_to_id", Value::Null);
        assert_eq!(record.get("headline"), Some(&Value::from("Hello")));
        assert_eq!(record.reference("blog_id"), Some(ObjectId(1)));
        assert_eq!(record.reference("in_reply_to_id"), None);
        assert_eq!(record.reference("missing"), None);
    }
}
