//! 错误类型

use thiserror::Error;

/// 结构树定义阶段的配置错误（不可恢复，属于程序员错误）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("数组节点 `{array}` 已有子节点 `{existing}`，不能再添加 `{rejected}`")]
    ArrayChildOverflow {
        array: String,
        existing: String,
        rejected: String,
    },
    #[error("`{0}` 未注册为数组节点")]
    NotAnArray(String),
    #[error("把 `{child}` 挂到 `{parent}` 下会形成环")]
    Cycle { child: String, parent: String },
    #[error("根节点不能挂到 `{0}` 下")]
    RootAsChild(String),
}

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("结构错误: {0}")]
    Structure(#[from] StructureError),
    #[error("缺少依赖: {0}")]
    MissingDependency(&'static str),
}
