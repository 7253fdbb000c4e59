//! 内存对象存储
//!
//! 模型、记录、外键与多对多关系，以及 Django 风格的过滤链

mod filter;
mod index;
mod memory;
mod record;
mod snapshot;

pub use filter::LOOKUPS;
pub use index::LinkIndex;
pub use memory::MemoryStore;
pub use record::Record;
pub use snapshot::{ForeignKeySpec, ManyToManySpec, ModelSnapshot, Snapshot};
