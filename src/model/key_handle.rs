//! 键句柄：把一个 JSON 键（及数组下标）与模型字段双向绑定
//!
//! 写方向用 [`WriteKeyHandle`] 从模型取值填入空白文档；读方向用
//! [`ReadKeyHandle`] 把文档叶子应用回模型。[`WriteHandler`] / [`ReadHandler`]
//! 把句柄包装成导航器可用的 [`NodeHandler`]。

use serde_json::{Map, Value};

use crate::model::navigation::NodeHandler;

pub trait WriteKeyHandle: Send {
    /// `None` 表示跳过，保留空白文档中的原值
    fn retrieve_for_object(&mut self, key: &str) -> Option<Value>;

    fn retrieve_for_array(&mut self, _key: &str, _index: usize) -> Option<Value> {
        None
    }

    fn object_started(&mut self, _key: &str) {}
    fn object_finished(&mut self, _key: &str) {}
    fn array_started(&mut self, _key: &str) {}
    fn array_finished(&mut self, _key: &str) {}
}

pub trait ReadKeyHandle: Send {
    /// `null` 原样传入，由模型决定如何解释
    fn apply_for_object(&mut self, key: &str, value: &Value);

    fn apply_for_array(&mut self, _key: &str, _index: usize, _value: &Value) {}

    fn object_started(&mut self, _key: &str) {}
    fn object_finished(&mut self, _key: &str) {}
    fn array_started(&mut self, _key: &str) {}
    fn array_finished(&mut self, _key: &str) {}
}

/// 写策略
pub struct WriteHandler<H>(pub H);

impl<H: WriteKeyHandle> NodeHandler for WriteHandler<H> {
    fn on_object_leaf(&mut self, key: &str, object: &mut Map<String, Value>) {
        if let Some(value) = self.0.retrieve_for_object(key) {
            object.insert(key.to_string(), value);
        }
    }

    fn on_array_leaf(&mut self, key: &str, array: &mut Vec<Value>, index: usize) {
        if let Some(value) = self.0.retrieve_for_array(key, index) {
            array[index] = value;
        }
    }

    fn object_started(&mut self, key: &str) {
        self.0.object_started(key);
    }

    fn object_finished(&mut self, key: &str) {
        self.0.object_finished(key);
    }

    fn array_started(&mut self, key: &str) {
        self.0.array_started(key);
    }

    fn array_finished(&mut self, key: &str) {
        self.0.array_finished(key);
    }
}

/// 读策略
pub struct ReadHandler<H>(pub H);

impl<H: ReadKeyHandle> NodeHandler for ReadHandler<H> {
    fn on_object_leaf(&mut self, key: &str, object: &mut Map<String, Value>) {
        if let Some(value) = object.get(key) {
            self.0.apply_for_object(key, value);
        }
    }

    fn on_array_leaf(&mut self, key: &str, array: &mut Vec<Value>, index: usize) {
        if let Some(value) = array.get(index) {
            self.0.apply_for_array(key, index, value);
        }
    }

    fn object_started(&mut self, key: &str) {
        self.0.object_started(key);
    }

    fn object_finished(&mut self, key: &str) {
        self.0.object_finished(key);
    }

    fn array_started(&mut self, key: &str) {
        self.0.array_started(key);
    }

    fn array_finished(&mut self, key: &str) {
        self.0.array_finished(key);
    }
}

type ObjectRetriever = Box<dyn FnMut(&str) -> Option<Value> + Send>;
type ArrayRetriever = Box<dyn FnMut(&str, usize) -> Option<Value> + Send>;
type ObjectApplier = Box<dyn FnMut(&str, &Value) + Send>;
type ArrayApplier = Box<dyn FnMut(&str, usize, &Value) + Send>;

/// 由可选闭包组成的写句柄；缺失的闭包等价于返回 `None`
#[derive(Default)]
pub struct ClosureWriteHandle {
    object: Option<ObjectRetriever>,
    array: Option<ArrayRetriever>,
}

impl ClosureWriteHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_object(mut self, f: impl FnMut(&str) -> Option<Value> + Send + 'static) -> Self {
        self.object = Some(Box::new(f));
        self
    }

    pub fn on_array(mut self, f: impl FnMut(&str, usize) -> Option<Value> + Send + 'static) -> Self {
        self.array = Some(Box::new(f));
        self
    }
}

impl WriteKeyHandle for ClosureWriteHandle {
    fn retrieve_for_object(&mut self, key: &str) -> Option<Value> {
        self.object.as_mut().and_then(|f| f(key))
    }

    fn retrieve_for_array(&mut self, key: &str, index: usize) -> Option<Value> {
        self.array.as_mut().and_then(|f| f(key, index))
    }
}

/// 由可选闭包组成的读句柄；缺失的闭包等价于无操作
#[derive(Default)]
pub struct ClosureReadHandle {
    object: Option<ObjectApplier>,
    array: Option<ArrayApplier>,
}

impl ClosureReadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_object(mut self, f: impl FnMut(&str, &Value) + Send + 'static) -> Self {
        self.object = Some(Box::new(f));
        self
    }

    pub fn on_array(mut self, f: impl FnMut(&str, usize, &Value) + Send + 'static) -> Self {
        self.array = Some(Box::new(f));
        self
    }
}

impl ReadKeyHandle for ClosureReadHandle {
    fn apply_for_object(&mut self, key: &str, value: &Value) {
        if let Some(f) = self.object.as_mut() {
            f(key, value);
        }
    }

    fn apply_for_array(&mut self, key: &str, index: usize, value: &Value) {
        if let Some(f) = self.array.as_mut() {
            f(key, index, value);
        }
    }
}
