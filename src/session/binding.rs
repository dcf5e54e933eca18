//! 把可观察元素绑定到 JSON 键：值经 serde 转成叶子，读回时再反序列化
//!
//! - 单值：对象中的一个叶子
//! - 序列：一个数组，元素为叶子
//! - 映射：一个数组，每个元素是 `[键, 值]` 二元数组
//!
//! 绑定的值必须序列化为叶子（数字、字符串、布尔、`null`）；序列化成对象或
//! 数组的值无法按叶子读回，写出时跳过，对应位置保持空白。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::model::document::NodeKind;
use crate::model::error::StructureError;
use crate::model::key_handle::{ReadHandler, ReadKeyHandle, WriteHandler, WriteKeyHandle};
use crate::model::navigation::Navigator;
use crate::model::structure::StructureTree;
use crate::session::observable::{ObservableCell, ObservableList, ObservableMap};

fn to_leaf<T: Serialize>(key: &str, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) if NodeKind::of(&v) == NodeKind::Leaf => Some(v),
        Ok(v) => {
            tracing::warn!("键 `{}` 的值 {} 不是叶子，跳过", key, v);
            None
        }
        Err(e) => {
            tracing::warn!("键 `{}` 的值无法序列化，跳过: {}", key, e);
            None
        }
    }
}

fn from_leaf<T: DeserializeOwned>(key: &str, value: &Value) -> Option<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("键 `{}` 的值 {} 无法转换为模型类型，忽略: {}", key, value, e);
            None
        }
    }
}

/// 映射条目所用的内层数组键
pub fn map_entry_key(key: &str) -> String {
    format!("{}.entry", key)
}

/// 在结构中声明一个序列，长度取当前元素个数
pub fn declare_list<T>(
    tree: &mut StructureTree,
    key: &str,
    parent: &str,
    list: &ObservableList<T>,
) -> Result<(), StructureError> {
    tree.add_array(key, parent)?.set_array_size(key, list.len())?;
    Ok(())
}

/// 在结构中声明一个映射：外层数组长度 = 条目数，内层 `[键, 值]` 长度为 2
pub fn declare_map<K: Ord, V>(
    tree: &mut StructureTree,
    key: &str,
    parent: &str,
    map: &ObservableMap<K, V>,
) -> Result<(), StructureError> {
    let entry = map_entry_key(key);
    tree.add_array(key, parent)?
        .set_array_size(key, map.len())?
        .add_array(&entry, key)?
        .set_array_size(&entry, 2)?;
    Ok(())
}

pub struct CellBinding<T> {
    cell: Arc<ObservableCell<T>>,
}

impl<T> CellBinding<T> {
    pub fn new(cell: Arc<ObservableCell<T>>) -> Self {
        Self { cell }
    }
}

impl<T: Serialize + Send + Sync> WriteKeyHandle for CellBinding<T> {
    fn retrieve_for_object(&mut self, key: &str) -> Option<Value> {
        self.cell.with(|v| to_leaf(key, v))
    }
}

impl<T: DeserializeOwned + Send + Sync> ReadKeyHandle for CellBinding<T> {
    fn apply_for_object(&mut self, key: &str, value: &Value) {
        if let Some(v) = from_leaf(key, value) {
            self.cell.set(v);
        }
    }
}

pub struct ListBinding<T> {
    list: Arc<ObservableList<T>>,
    depth: usize,
    pending: Option<Vec<T>>,
}

impl<T> ListBinding<T> {
    pub fn new(list: Arc<ObservableList<T>>) -> Self {
        Self {
            list,
            depth: 0,
            pending: None,
        }
    }
}

impl<T: Serialize + Clone + Send + Sync> WriteKeyHandle for ListBinding<T> {
    fn retrieve_for_object(&mut self, _key: &str) -> Option<Value> {
        None
    }

    fn retrieve_for_array(&mut self, key: &str, index: usize) -> Option<Value> {
        self.list.get(index).and_then(|v| to_leaf(key, &v))
    }
}

impl<T: DeserializeOwned + Send + Sync> ReadKeyHandle for ListBinding<T> {
    fn apply_for_object(&mut self, _key: &str, _value: &Value) {}

    fn apply_for_array(&mut self, key: &str, _index: usize, value: &Value) {
        if self.depth != 1 {
            return;
        }
        if let (Some(items), Some(v)) = (self.pending.as_mut(), from_leaf(key, value)) {
            items.push(v);
        }
    }

    fn array_started(&mut self, _key: &str) {
        self.depth += 1;
        if self.depth == 1 {
            self.pending = Some(Vec::new());
        }
    }

    fn array_finished(&mut self, _key: &str) {
        if self.depth == 1 {
            if let Some(items) = self.pending.take() {
                self.list.replace_all(items);
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

pub struct MapBinding<V> {
    map: Arc<ObservableMap<String, V>>,
    depth: usize,
    /// 写方向：外层数组开始时拍下的条目
    entries: Vec<(String, V)>,
    row: Option<usize>,
    /// 读方向
    pending: Option<Vec<(String, V)>>,
    current: (Option<String>, Option<V>),
}

impl<V> MapBinding<V> {
    pub fn new(map: Arc<ObservableMap<String, V>>) -> Self {
        Self {
            map,
            depth: 0,
            entries: Vec::new(),
            row: None,
            pending: None,
            current: (None, None),
        }
    }
}

impl<V: Serialize + Clone + Send + Sync> WriteKeyHandle for MapBinding<V> {
    fn retrieve_for_object(&mut self, _key: &str) -> Option<Value> {
        None
    }

    fn retrieve_for_array(&mut self, key: &str, index: usize) -> Option<Value> {
        if self.depth != 2 {
            return None;
        }
        let (k, v) = self.entries.get(self.row?)?;
        match index {
            0 => Some(Value::String(k.clone())),
            1 => to_leaf(key, v),
            _ => None,
        }
    }

    fn array_started(&mut self, _key: &str) {
        self.depth += 1;
        match self.depth {
            1 => {
                self.entries = self.map.snapshot();
                self.row = None;
            }
            2 => self.row = Some(self.row.map_or(0, |r| r + 1)),
            _ => {}
        }
    }

    fn array_finished(&mut self, _key: &str) {
        if self.depth == 1 {
            self.entries.clear();
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

impl<V: DeserializeOwned + Send + Sync> ReadKeyHandle for MapBinding<V> {
    fn apply_for_object(&mut self, _key: &str, _value: &Value) {}

    fn apply_for_array(&mut self, key: &str, index: usize, value: &Value) {
        if self.depth != 2 {
            return;
        }
        match index {
            0 => self.current.0 = value.as_str().map(str::to_string),
            1 => self.current.1 = from_leaf(key, value),
            _ => {}
        }
    }

    fn array_started(&mut self, _key: &str) {
        self.depth += 1;
        match self.depth {
            1 => self.pending = Some(Vec::new()),
            2 => self.current = (None, None),
            _ => {}
        }
    }

    fn array_finished(&mut self, key: &str) {
        match self.depth {
            1 => {
                if let Some(entries) = self.pending.take() {
                    self.map.replace_all(entries);
                }
            }
            2 => {
                let current = std::mem::replace(&mut self.current, (None, None));
                match (current, self.pending.as_mut()) {
                    ((Some(k), Some(v)), Some(entries)) => entries.push((k, v)),
                    _ => tracing::warn!("键 `{}` 中有不完整的映射条目，忽略", key),
                }
            }
            _ => {}
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

/// 单值绑定到叶子 `key`；`T` 须序列化为叶子
pub fn bind_cell<T>(reader: &mut Navigator, writer: &mut Navigator, key: &str, cell: &Arc<ObservableCell<T>>)
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    reader.when(key, ReadHandler(CellBinding::new(cell.clone())));
    writer.when(key, WriteHandler(CellBinding::new(cell.clone())));
}

/// 序列绑定到数组 `key`，元素须序列化为叶子
pub fn bind_list<T>(reader: &mut Navigator, writer: &mut Navigator, key: &str, list: &Arc<ObservableList<T>>)
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    reader.when(key, ReadHandler(ListBinding::new(list.clone())));
    writer.when(key, WriteHandler(ListBinding::new(list.clone())));
}

/// 映射绑定到数组 `key`，值须序列化为叶子
pub fn bind_map<V>(
    reader: &mut Navigator,
    writer: &mut Navigator,
    key: &str,
    map: &Arc<ObservableMap<String, V>>,
) where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    reader.when(key, ReadHandler(MapBinding::new(map.clone())));
    writer.when(key, WriteHandler(MapBinding::new(map.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ROOT_KEY;
    use crate::model::marshaller::{DynamicMarshaller, ModelMarshaller, ReadOutcome};
    use crate::model::protocol::MemoryProtocol;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    enum Theme {
        Light,
        Dark,
    }

    struct Prefs {
        theme: Arc<ObservableCell<Theme>>,
        nickname: Arc<ObservableCell<Option<String>>>,
        volume: Arc<ObservableCell<u8>>,
    }

    fn prefs() -> Prefs {
        Prefs {
            theme: Arc::new(ObservableCell::new(Theme::Light)),
            nickname: Arc::new(ObservableCell::new(Some("小明".to_string()))),
            volume: Arc::new(ObservableCell::new(30)),
        }
    }

    fn prefs_marshaller(p: &Prefs, protocol: Arc<MemoryProtocol>) -> ModelMarshaller {
        let mut tree = StructureTree::new();
        tree.add_child("theme", ROOT_KEY)
            .and_then(|t| t.add_child("nickname", ROOT_KEY))
            .and_then(|t| t.add_child("volume", ROOT_KEY))
            .unwrap();
        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_cell(&mut reader, &mut writer, "theme", &p.theme);
        bind_cell(&mut reader, &mut writer, "nickname", &p.nickname);
        bind_cell(&mut reader, &mut writer, "volume", &p.volume);
        ModelMarshaller::builder()
            .structure(tree)
            .reader(reader)
            .writer(writer)
            .protocol(protocol)
            .build()
            .unwrap()
    }

    #[test]
    fn test_cells_round_trip() {
        let p = prefs();
        let protocol = Arc::new(MemoryProtocol::new());
        let mut m = prefs_marshaller(&p, protocol.clone());

        p.theme.set(Theme::Dark);
        assert!(m.write());
        assert_eq!(
            protocol.document(),
            Some(json!({"theme": "dark", "nickname": "小明", "volume": 30}))
        );

        p.theme.set(Theme::Light);
        p.nickname.set(None);
        p.volume.set(0);
        assert_eq!(m.read(), ReadOutcome::Applied);
        assert_eq!(p.theme.get(), Theme::Dark);
        assert_eq!(p.nickname.get(), Some("小明".to_string()));
        assert_eq!(p.volume.get(), 30);
    }

    #[test]
    fn test_null_reaches_model_and_bad_values_ignored() {
        let p = prefs();
        let protocol = Arc::new(MemoryProtocol::with_document(json!({
            "nickname": null,
            "volume": "很大",
            "theme": "dark"
        })));
        let mut m = prefs_marshaller(&p, protocol);

        assert_eq!(m.read(), ReadOutcome::Applied);
        assert_eq!(p.nickname.get(), None, "null 交给模型解释为 None");
        assert_eq!(p.volume.get(), 30, "类型不符时保持原值");
        assert_eq!(p.theme.get(), Theme::Dark);
    }

    #[test]
    fn test_list_and_map_follow_dynamic_structure() {
        let recent = Arc::new(ObservableList::new(vec!["a.json".to_string()]));
        let aliases: Arc<ObservableMap<String, i64>> = Arc::new(ObservableMap::new());
        aliases.insert("one".into(), 1);

        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_list(&mut reader, &mut writer, "recent", &recent);
        bind_map(&mut reader, &mut writer, "aliases", &aliases);

        let (list_src, map_src) = (recent.clone(), aliases.clone());
        let mut m = DynamicMarshaller::builder()
            .structure_with(move || {
                let mut tree = StructureTree::new();
                declare_list(&mut tree, "recent", ROOT_KEY, &list_src)?;
                declare_map(&mut tree, "aliases", ROOT_KEY, &map_src)?;
                Ok(tree)
            })
            .reader(reader)
            .writer(writer)
            .build()
            .unwrap();

        let protocol = MemoryProtocol::new();
        recent.push("b.json".into());
        aliases.insert("two".into(), 2);
        assert!(m.write(&protocol));
        assert_eq!(
            protocol.document(),
            Some(json!({
                "recent": ["a.json", "b.json"],
                "aliases": [["one", 1], ["two", 2]]
            }))
        );

        recent.clear();
        aliases.clear();
        assert_eq!(m.read(&protocol), ReadOutcome::Applied);
        assert_eq!(recent.snapshot(), vec!["a.json", "b.json"]);
        assert_eq!(
            aliases.snapshot(),
            vec![("one".to_string(), 1), ("two".to_string(), 2)]
        );
    }

    #[test]
    fn test_incomplete_map_entries_dropped() {
        let aliases: Arc<ObservableMap<String, i64>> = Arc::new(ObservableMap::new());
        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_map(&mut reader, &mut writer, "aliases", &aliases);

        let mut doc = json!({"aliases": [["ok", 5], [7, 8], ["short"]]});
        reader.parse(&mut doc);

        assert_eq!(aliases.snapshot(), vec![("ok".to_string(), 5)]);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Size {
        w: u32,
        h: u32,
    }

    #[test]
    fn test_container_values_left_blank() {
        let size = Arc::new(ObservableCell::new(Size { w: 1, h: 2 }));
        let volume = Arc::new(ObservableCell::new(30_u8));
        let mut tree = StructureTree::new();
        tree.add_child("size", ROOT_KEY)
            .and_then(|t| t.add_child("volume", ROOT_KEY))
            .unwrap();
        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_cell(&mut reader, &mut writer, "size", &size);
        bind_cell(&mut reader, &mut writer, "volume", &volume);
        let protocol = Arc::new(MemoryProtocol::new());
        let mut m = ModelMarshaller::builder()
            .structure(tree)
            .reader(reader)
            .writer(writer)
            .protocol(protocol.clone())
            .build()
            .unwrap();

        assert!(m.write());
        assert_eq!(protocol.document(), Some(json!({"size": null, "volume": 30})));

        size.set(Size { w: 9, h: 9 });
        volume.set(0);
        assert_eq!(m.read(), ReadOutcome::Applied, "写出的文档应能按结构读回");
        assert_eq!(volume.get(), 30);
        assert_eq!(size.get(), Size { w: 9, h: 9 }, "空白位置不覆盖模型");
    }

    #[test]
    fn test_nested_list_elements_left_blank() {
        let grid = Arc::new(ObservableList::new(vec![vec![1, 2], vec![3]]));
        let mut tree = StructureTree::new();
        declare_list(&mut tree, "grid", ROOT_KEY, &grid).unwrap();
        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_list(&mut reader, &mut writer, "grid", &grid);

        let mut doc = tree.build();
        writer.parse(&mut doc);
        assert_eq!(doc, json!({"grid": [null, null]}));
    }
}
