//! 结构树（Structure Tree）：声明文档应有的形状，只存键名与父子关系，不存值
//!
//! - 对象节点：有子键的普通节点，构建为对象
//! - 叶子节点：无子键的普通节点，构建为 `null` 占位
//! - 数组节点：至多一个子键（元素模板），可选固定长度

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::ROOT_KEY;
use crate::model::document::NodeKind;
use crate::model::error::StructureError;

#[derive(Debug, Clone, Default)]
struct StructureNode {
    /// 有序、无重复
    children: Vec<String>,
    is_array: bool,
}

#[derive(Debug, Clone)]
pub struct StructureTree {
    nodes: HashMap<String, StructureNode>,
    /// 数组键 -> 固定长度（`None` 表示按文档实例动态决定）
    array_sizes: HashMap<String, Option<usize>>,
}

impl Default for StructureTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_KEY.to_string(), StructureNode::default());
        Self {
            nodes,
            array_sizes: HashMap::new(),
        }
    }

    /// 在 `parent` 下登记 `child`；重复登记同一个子键是无操作
    pub fn add_child(&mut self, child: &str, parent: &str) -> Result<&mut Self, StructureError> {
        if child == ROOT_KEY {
            return Err(StructureError::RootAsChild(parent.to_string()));
        }
        if child == parent || self.reaches(child, parent) {
            return Err(StructureError::Cycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        {
            let node = self.nodes.entry(parent.to_string()).or_default();
            if !node.children.iter().any(|c| c == child) {
                if node.is_array {
                    if let Some(existing) = node.children.first() {
                        return Err(StructureError::ArrayChildOverflow {
                            array: parent.to_string(),
                            existing: existing.clone(),
                            rejected: child.to_string(),
                        });
                    }
                }
                node.children.push(child.to_string());
            }
        }
        self.nodes.entry(child.to_string()).or_default();
        Ok(self)
    }

    /// 登记数组节点；已有两个以上子键的节点不能再标记为数组
    pub fn add_array(&mut self, array_key: &str, parent: &str) -> Result<&mut Self, StructureError> {
        if let Some(node) = self.nodes.get(array_key) {
            if node.children.len() > 1 {
                return Err(StructureError::ArrayChildOverflow {
                    array: array_key.to_string(),
                    existing: node.children[0].clone(),
                    rejected: node.children[1].clone(),
                });
            }
        }
        self.add_child(array_key, parent)?;
        if let Some(node) = self.nodes.get_mut(array_key) {
            node.is_array = true;
        }
        self.array_sizes.entry(array_key.to_string()).or_insert(None);
        Ok(self)
    }

    pub fn set_array_size(&mut self, array_key: &str, length: usize) -> Result<&mut Self, StructureError> {
        match self.array_sizes.get_mut(array_key) {
            Some(size) => {
                *size = Some(length);
                Ok(self)
            }
            None => Err(StructureError::NotAnArray(array_key.to_string())),
        }
    }

    /// 未知父键返回空切片
    pub fn children_of(&self, parent: &str) -> &[String] {
        self.nodes
            .get(parent)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_array(&self, key: &str) -> bool {
        self.nodes.get(key).is_some_and(|n| n.is_array)
    }

    pub fn array_size(&self, key: &str) -> Option<usize> {
        self.array_sizes.get(key).copied().flatten()
    }

    /// `from` 的子树中是否包含 `target`
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        while let Some(key) = stack.pop() {
            for child in self.children_of(key) {
                if child == target {
                    return true;
                }
                stack.push(child);
            }
        }
        false
    }

    /// 按结构生成空白文档
    pub fn build(&self) -> Value {
        Value::Object(self.build_object(ROOT_KEY))
    }

    fn build_object(&self, key: &str) -> Map<String, Value> {
        let mut map = Map::new();
        for child in self.children_of(key) {
            map.insert(child.clone(), self.build_node(child));
        }
        map
    }

    fn build_node(&self, key: &str) -> Value {
        if self.is_array(key) {
            let len = self.array_size(key).unwrap_or(0);
            let template = self.children_of(key).first();
            let items = (0..len)
                .map(|_| template.map_or(Value::Null, |t| self.build_node(t)))
                .collect();
            Value::Array(items)
        } else if self.children_of(key).is_empty() {
            Value::Null
        } else {
            Value::Object(self.build_object(key))
        }
    }

    /// 形状兼容性检查：结构声明的每个位置上，文档的容器种类必须一致。
    /// 文档中缺失（或为 `null`）的分支视为可选，多余的键忽略。
    pub fn is_compatible(&self, document: &Value) -> bool {
        match document {
            Value::Object(map) => self.object_compatible(ROOT_KEY, map),
            _ => false,
        }
    }

    fn object_compatible(&self, key: &str, map: &Map<String, Value>) -> bool {
        self.children_of(key).iter().all(|child| match map.get(child) {
            None => true,
            Some(v) => self.node_compatible(child, v),
        })
    }

    fn node_compatible(&self, key: &str, v: &Value) -> bool {
        if v.is_null() {
            return true;
        }
        if self.is_array(key) {
            let Value::Array(items) = v else {
                return false;
            };
            match self.children_of(key).first() {
                Some(template) => items.iter().all(|item| self.node_compatible(template, item)),
                None => true,
            }
        } else if self.children_of(key).is_empty() {
            NodeKind::of(v) == NodeKind::Leaf
        } else {
            match v {
                Value::Object(map) => self.object_compatible(key, map),
                _ => false,
            }
        }
    }
}
