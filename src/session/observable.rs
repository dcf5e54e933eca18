//! 可观察模型元素：单值、有序序列、键值映射
//!
//! 只提供“发生了变化”的脉冲，不携带变更内容。监听器在数据锁释放之后调用，
//! 因此监听器里再读取同一个元素不会死锁。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// 订阅凭据，用于退订
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait Observable: Send + Sync {
    fn subscribe(&self, listener: Listener) -> SubscriptionId;
    /// 未知的凭据返回 `false`
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
struct ListenerSlots {
    next: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

#[derive(Default)]
struct Listeners(Mutex<ListenerSlots>);

impl Listeners {
    fn add(&self, listener: Listener) -> SubscriptionId {
        let mut slots = self.0.lock();
        let id = SubscriptionId(slots.next);
        slots.next += 1;
        slots.entries.push((id, listener));
        id
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut slots = self.0.lock();
        let before = slots.entries.len();
        slots.entries.retain(|(entry, _)| *entry != id);
        slots.entries.len() != before
    }

    fn len(&self) -> usize {
        self.0.lock().entries.len()
    }

    fn notify(&self) {
        // 先拷贝一份，监听器内部可以继续订阅或退订
        let listeners: Vec<Listener> = self
            .0
            .lock()
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// 单值
pub struct ObservableCell<T> {
    value: RwLock<T>,
    listeners: Listeners,
}

impl<T: Default> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> ObservableCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            listeners: Listeners::default(),
        }
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.listeners.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut *self.value.write());
        self.listeners.notify();
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.value.read())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T: Clone> ObservableCell<T> {
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: Send + Sync> Observable for ObservableCell<T> {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}

/// 有序序列
pub struct ObservableList<T> {
    items: RwLock<Vec<T>>,
    listeners: Listeners,
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> ObservableList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            listeners: Listeners::default(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.write().push(item);
        self.listeners.notify();
    }

    /// 越界时返回 `false`，不通知
    pub fn insert(&self, index: usize, item: T) -> bool {
        {
            let mut items = self.items.write();
            if index > items.len() {
                return false;
            }
            items.insert(index, item);
        }
        self.listeners.notify();
        true
    }

    /// 返回被替换的旧值；越界时返回 `None`，不通知
    pub fn set(&self, index: usize, item: T) -> Option<T> {
        let old = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item)
        };
        self.listeners.notify();
        Some(old)
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let removed = {
            let mut items = self.items.write();
            (index < items.len()).then(|| items.remove(index))
        };
        if removed.is_some() {
            self.listeners.notify();
        }
        removed
    }

    pub fn clear(&self) {
        self.items.write().clear();
        self.listeners.notify();
    }

    /// 整体替换（只通知一次）
    pub fn replace_all(&self, items: Vec<T>) {
        *self.items.write() = items;
        self.listeners.notify();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T: Clone> ObservableList<T> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }
}

impl<T: Send + Sync> Observable for ObservableList<T> {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}

/// 键值映射（按键排序，写出顺序稳定）
pub struct ObservableMap<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
    listeners: Listeners,
}

impl<K: Ord, V> Default for ObservableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> ObservableMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let old = self.entries.write().insert(key, value);
        self.listeners.notify();
        old
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.listeners.notify();
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.listeners.notify();
    }

    pub fn replace_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        *self.entries.write() = entries.into_iter().collect();
        self.listeners.notify();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<K: Ord + Clone, V: Clone> ObservableMap<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Send + Sync, V: Send + Sync> Observable for ObservableMap<K, V> {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}
