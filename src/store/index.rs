//! 关系索引
//!
//! 外键与多对多关系共用的双向邻接索引

use crate::types::ObjectId;
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::collections::HashMap;

/// 双向链接索引：`from -> to` 与 `to -> from`
#[derive(Default)]
pub struct LinkIndex {
    /// 正向邻接
    forward: RwLock<HashMap<ObjectId, IndexSet<ObjectId>>>,
    /// 反向邻接
    reverse: RwLock<HashMap<ObjectId, IndexSet<ObjectId>>>,
}

impl LinkIndex {
    /// 创建新索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加链接
    pub fn link(&self, from: ObjectId, to: ObjectId) {
        self.forward.write().entry(from).or_default().insert(to);
        self.reverse.write().entry(to).or_default().insert(from);
    }

    /// 移除 `from` 的全部正向链接（外键重新赋值时使用）
    pub fn unlink_from(&self, from: ObjectId) {
        let targets = self.forward.write().remove(&from).unwrap_or_default();
        let mut reverse = self.reverse.write();
        for to in targets {
            if let Some(set) = reverse.get_mut(&to) {
                set.shift_remove(&from);
            }
        }
    }

    /// 正向目标
    pub fn targets(&self, from: ObjectId) -> Vec<ObjectId> {
        self.forward
            .read()
            .get(&from)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 反向来源
    pub fn sources(&self, to: ObjectId) -> Vec<ObjectId> {
        self.reverse
            .read()
            .get(&to)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 链接总数
    pub fn len(&self) -> usize {
        self.forward.read().values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_index() {
        let index = LinkIndex::new();
        index.link(ObjectId(1), ObjectId(10));
        index.link(ObjectId(1), ObjectId(11));
        index.link(ObjectId(2), ObjectId(10));
        index.link(ObjectId(2), ObjectId(10));

        assert_eq!(index.len(), 3);
        assert_eq!(index.targets(ObjectId(1)), vec![ObjectId(10), ObjectId(11)]);
        assert_eq!(index.sources(ObjectId(10)), vec![ObjectId(1), ObjectId(2)]);

        index.unlink_from(ObjectId(1));
        assert!(index.targets(ObjectId(1)).is_empty());
        assert_eq!(index.sources(ObjectId(10)), vec![ObjectId(2)]);
        assert!(index.sources(ObjectId(11)).is_empty());
    }
}
