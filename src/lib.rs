//! Curio - 关系图查询语言
//!
//! 在对象模型之上执行文本图查询：
//! - 手写递归下降解析器与可重新序列化的 AST
//! - 批量关系提供者，保留跨多跳的来源信息
//! - 四种递归收集模式、子查询 having 条件、OR 并集
//! - 通过 `,` 连接生成带 back_index 的扁平结果组
//! - 内存对象存储与交互式命令行

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod provider;
pub mod query;
pub mod store;
pub mod testing;
pub mod types;

// 重导出常用类型
pub use catalog::{Catalog, ModelEntry, RelationEntry, RelationKind};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use provider::{Edge, ObjectProvider, RelationProvider};
pub use query::{run, Query, QueryAst, QueryExecutor, QueryResult, QueryStats, ResultGroup};
pub use store::{MemoryStore, Record};
pub use types::{ObjectId, Value};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
