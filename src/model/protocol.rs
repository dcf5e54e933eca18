//! 持久化协议：对某个“位置”读写整份文档

use parking_lot::Mutex;
use serde_json::Value;

pub trait PersistenceProtocol: Send + Sync {
    /// `None` 表示未找到或内容损坏，两者不区分
    fn read_from_location(&self) -> Option<Value>;

    /// `false` 表示写入失败（不重试）
    fn write_to_location(&self, document: &Value) -> bool;
}

impl<P: PersistenceProtocol + ?Sized> PersistenceProtocol for Box<P> {
    fn read_from_location(&self) -> Option<Value> {
        (**self).read_from_location()
    }

    fn write_to_location(&self, document: &Value) -> bool {
        (**self).write_to_location(document)
    }
}

impl<P: PersistenceProtocol + ?Sized> PersistenceProtocol for std::sync::Arc<P> {
    fn read_from_location(&self) -> Option<Value> {
        (**self).read_from_location()
    }

    fn write_to_location(&self, document: &Value) -> bool {
        (**self).write_to_location(document)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    document: Option<Value>,
    reads: usize,
    writes: usize,
    fail_writes: bool,
}

/// 内存中的位置，测试与嵌入场景使用
#[derive(Debug, Default)]
pub struct MemoryProtocol {
    state: Mutex<MemoryState>,
}

impl MemoryProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        let protocol = Self::default();
        protocol.state.lock().document = Some(document);
        protocol
    }

    pub fn document(&self) -> Option<Value> {
        self.state.lock().document.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    /// 成功写入的次数
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl PersistenceProtocol for MemoryProtocol {
    fn read_from_location(&self) -> Option<Value> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.document.clone()
    }

    fn write_to_location(&self, document: &Value) -> bool {
        let mut state = self.state.lock();
        if state.fail_writes {
            return false;
        }
        state.writes += 1;
        state.document = Some(document.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_protocol_counts() {
        let p = MemoryProtocol::new();
        assert_eq!(p.read_from_location(), None);
        assert!(p.write_to_location(&json!({"a": 1})));
        assert_eq!(p.read_from_location(), Some(json!({"a": 1})));
        assert_eq!((p.reads(), p.writes()), (2, 1));
    }

    #[test]
    fn test_memory_protocol_failing_writes_keep_old_document() {
        let p = MemoryProtocol::with_document(json!({"v": 1}));
        p.set_fail_writes(true);
        assert!(!p.write_to_location(&json!({"v": 2})));
        assert_eq!(p.document(), Some(json!({"v": 1})));
        assert_eq!(p.writes(), 0);
    }
}
