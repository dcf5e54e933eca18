//! IO helper: JSON file read/write and the file-backed persistence protocol

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};

use crate::config::JSON_INDENT;
use crate::model::error::MarshalError;
use crate::model::protocol::PersistenceProtocol;

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path) -> Result<Value, MarshalError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    let v: Value = serde_json::from_reader(rdr)?;
    Ok(v)
}

/// 将JSON数据保存到文件（格式化输出，必要时创建父目录）
pub fn write_json_file(p: &Path, value: &Value) -> Result<(), MarshalError> {
    if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut w = BufWriter::new(File::create(p)?);
    let mut ser = Serializer::with_formatter(&mut w, PrettyFormatter::with_indent(JSON_INDENT));
    value.serialize(&mut ser)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// 以单个 JSON 文件为位置的持久化协议
#[derive(Debug, Clone)]
pub struct JsonFileProtocol {
    path: PathBuf,
}

impl JsonFileProtocol {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PersistenceProtocol for JsonFileProtocol {
    fn read_from_location(&self) -> Option<Value> {
        if !self.path.exists() {
            tracing::info!("文件不存在: {}", self.path.display());
            return None;
        }
        match read_json_file(&self.path) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("文件无法读取，按不存在处理: {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write_to_location(&self, document: &Value) -> bool {
        match write_json_file(&self.path, document) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("文件保存失败: {}: {}", self.path.display(), e);
                false
            }
        }
    }
}
