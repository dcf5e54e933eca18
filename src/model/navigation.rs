//! 导航分发器：深度优先遍历文档，按键把容器进出事件与叶子事件分发给处理器
//!
//! 遍历顺序即文档自身顺序：对象按键的插入顺序，数组按下标。
//! 未绑定处理器的键不会中断遍历，仍会结构性地向下递归。

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::ROOT_KEY;
use crate::model::document::NodeKind;

/// 处理器的六个钩子，全部默认无操作
pub trait NodeHandler: Send {
    /// 对象中的叶子；处理器可读取也可改写 `object[key]`
    fn on_object_leaf(&mut self, _key: &str, _object: &mut Map<String, Value>) {}
    /// 数组中的叶子；数组内的元素沿用数组自身的键
    fn on_array_leaf(&mut self, _key: &str, _array: &mut Vec<Value>, _index: usize) {}
    fn object_started(&mut self, _key: &str) {}
    fn object_finished(&mut self, _key: &str) {}
    fn array_started(&mut self, _key: &str) {}
    fn array_finished(&mut self, _key: &str) {}
}

#[derive(Default)]
pub struct Navigator {
    handlers: HashMap<String, Box<dyn NodeHandler>>,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("Navigator").field("keys", &keys).finish()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 `key` 绑定处理器；同一个键后绑定的覆盖先绑定的
    pub fn when(&mut self, key: &str, handler: impl NodeHandler + 'static) -> &mut Self {
        if self.handlers.insert(key.to_string(), Box::new(handler)).is_some() {
            tracing::debug!("键 `{}` 的处理器被覆盖", key);
        }
        self
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// 深度优先遍历整个文档
    pub fn parse(&mut self, document: &mut Value) {
        match document {
            Value::Object(map) => self.walk_object(map),
            Value::Array(items) => {
                self.array_started(ROOT_KEY);
                self.walk_array(ROOT_KEY, items);
                self.array_finished(ROOT_KEY);
            }
            _ => tracing::debug!("文档根是叶子，跳过遍历"),
        }
    }

    fn walk_object(&mut self, object: &mut Map<String, Value>) {
        // 叶子处理器拿到的是整个对象，先取出键列表再逐个访问
        let keys: Vec<String> = object.keys().cloned().collect();
        for key in keys {
            let Some(kind) = object.get(&key).map(NodeKind::of) else {
                continue;
            };
            match kind {
                NodeKind::Object => {
                    self.object_started(&key);
                    if let Some(Value::Object(child)) = object.get_mut(&key) {
                        self.walk_object(child);
                    }
                    self.object_finished(&key);
                }
                NodeKind::Array => {
                    self.array_started(&key);
                    if let Some(Value::Array(items)) = object.get_mut(&key) {
                        self.walk_array(&key, items);
                    }
                    self.array_finished(&key);
                }
                NodeKind::Leaf => {
                    if let Some(handler) = self.handlers.get_mut(&key) {
                        handler.on_object_leaf(&key, object);
                    }
                }
            }
        }
    }

    fn walk_array(&mut self, key: &str, items: &mut Vec<Value>) {
        // 处理器可能改变数组长度，每轮重新取
        let mut index = 0;
        while let Some(kind) = items.get(index).map(NodeKind::of) {
            match kind {
                NodeKind::Object => {
                    self.object_started(key);
                    if let Value::Object(child) = &mut items[index] {
                        self.walk_object(child);
                    }
                    self.object_finished(key);
                }
                NodeKind::Array => {
                    self.array_started(key);
                    if let Value::Array(inner) = &mut items[index] {
                        self.walk_array(key, inner);
                    }
                    self.array_finished(key);
                }
                NodeKind::Leaf => {
                    if let Some(handler) = self.handlers.get_mut(key) {
                        handler.on_array_leaf(key, items, index);
                    }
                }
            }
            index += 1;
        }
    }

    fn object_started(&mut self, key: &str) {
        if let Some(h) = self.handlers.get_mut(key) {
            h.object_started(key);
        }
    }

    fn object_finished(&mut self, key: &str) {
        if let Some(h) = self.handlers.get_mut(key) {
            h.object_finished(key);
        }
    }

    fn array_started(&mut self, key: &str) {
        if let Some(h) = self.handlers.get_mut(key) {
            h.array_started(key);
        }
    }

    fn array_finished(&mut self, key: &str) {
        if let Some(h) = self.handlers.get_mut(key) {
            h.array_finished(key);
        }
    }
}
