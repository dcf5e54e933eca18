//! 文档视图：结构树与导航器只关心“叶子 / 对象 / 数组”三种形态

use serde_json::Value;

/// JSON 文档（`preserve_order`：对象键保持插入顺序）
pub type Document = Value;

/// 节点形态（不区分具体标量类型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
    Leaf,
}

impl NodeKind {
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Object(_) => NodeKind::Object,
            Value::Array(_) => NodeKind::Array,
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => NodeKind::Leaf,
        }
    }

    pub fn is_container(self) -> bool {
        !matches!(self, NodeKind::Leaf)
    }
}
