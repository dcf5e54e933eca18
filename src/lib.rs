//! JSON 模型持久化库
//!
//! 用结构树声明文档形状，导航分发器深度优先遍历文档并按键调用处理器，
//! 键句柄在文档叶子与模型字段之间双向搬运值；会话管理器把一串模型变更
//! 合并成一次后台写出。

pub mod config;
pub mod model;
pub mod session;
pub mod utils;

// 重新导出主要类型
pub use model::document::{Document, NodeKind};
pub use model::error::{MarshalError, StructureError};
pub use model::key_handle::{
    ClosureReadHandle, ClosureWriteHandle, ReadHandler, ReadKeyHandle, WriteHandler, WriteKeyHandle,
};
pub use model::marshaller::{DynamicMarshaller, ModelMarshaller, Persist, ReadOutcome};
pub use model::navigation::{NodeHandler, Navigator};
pub use model::protocol::{MemoryProtocol, PersistenceProtocol};
pub use model::structure::StructureTree;
pub use session::manager::SessionManager;
pub use session::observable::{
    Listener, Observable, ObservableCell, ObservableList, ObservableMap, SubscriptionId,
};
pub use utils::fs::JsonFileProtocol;
