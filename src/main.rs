//! 程序入口：初始化日志，演示设置模型的读取、变更合并与写出
//!
//! 用法: `json_marshaller [文件路径]`，每运行一次启动计数加一。

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use parking_lot::Mutex;
use tracing_subscriber::fmt::SubscriberBuilder;

use json_marshaller::config::{DEFAULT_DOCUMENT_FILE, ROOT_KEY};
use json_marshaller::session::binding::{bind_cell, bind_list, declare_list};
use json_marshaller::{
    DynamicMarshaller, JsonFileProtocol, Navigator, ObservableCell, ObservableList, Persist,
    ReadOutcome, SessionManager, StructureError, StructureTree,
};

const MAX_RECENT: usize = 5;

/// 演示用的设置模型
struct Settings {
    title: Arc<ObservableCell<String>>,
    width: Arc<ObservableCell<u32>>,
    height: Arc<ObservableCell<u32>>,
    launches: Arc<ObservableCell<u64>>,
    recent: Arc<ObservableList<String>>,
}

impl Settings {
    fn new() -> Self {
        Self {
            title: Arc::new(ObservableCell::new("未命名".to_string())),
            width: Arc::new(ObservableCell::new(800)),
            height: Arc::new(ObservableCell::new(600)),
            launches: Arc::new(ObservableCell::new(0)),
            recent: Arc::new(ObservableList::default()),
        }
    }

    fn navigators(&self) -> (Navigator, Navigator) {
        let (mut reader, mut writer) = (Navigator::new(), Navigator::new());
        bind_cell(&mut reader, &mut writer, "title", &self.title);
        bind_cell(&mut reader, &mut writer, "width", &self.width);
        bind_cell(&mut reader, &mut writer, "height", &self.height);
        bind_cell(&mut reader, &mut writer, "launches", &self.launches);
        bind_list(&mut reader, &mut writer, "recent", &self.recent);
        (reader, writer)
    }
}

/// 最近文件列表的长度随模型变化，所以结构每次写出时重新生成
fn structure_of(recent: &ObservableList<String>) -> Result<StructureTree, StructureError> {
    let mut tree = StructureTree::new();
    tree.add_child("title", ROOT_KEY)?
        .add_child("launches", ROOT_KEY)?
        .add_child("window", ROOT_KEY)?
        .add_child("width", "window")?
        .add_child("height", "window")?;
    declare_list(&mut tree, "recent", ROOT_KEY, recent)?;
    Ok(tree)
}

fn main() -> anyhow::Result<()> {
    // 初始化日志输出
    let _ = SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENT_FILE));

    let settings = Settings::new();
    structure_of(&settings.recent).context("结构定义无效")?;

    let (reader, writer) = settings.navigators();
    let recent = settings.recent.clone();
    let mut marshaller = DynamicMarshaller::builder()
        .structure_with(move || structure_of(&recent))
        .reader(reader)
        .writer(writer)
        .build()?;

    let protocol = JsonFileProtocol::new(&path);
    match marshaller.read(&protocol) {
        ReadOutcome::Applied => tracing::info!("已加载设置: {}", path.display()),
        outcome => tracing::info!("使用默认设置（{:?}）", outcome),
    }

    let persist = Arc::new(Mutex::new(move || marshaller.write(&protocol)));
    let session = SessionManager::start(persist.clone()).context("无法启动后台写线程")?;
    session.observe(&settings.title);
    session.observe(&settings.width);
    session.observe(&settings.height);
    session.observe(&settings.launches);
    session.observe(&settings.recent);

    settings.launches.update(|n| *n += 1);
    settings.width.update(|w| *w = (*w).max(1024));
    let current = path.display().to_string();
    if !settings.recent.snapshot().contains(&current) {
        settings.recent.push(current);
    }
    while settings.recent.len() > MAX_RECENT {
        settings.recent.remove(0);
    }

    // 停止后不会再有后台写出，最后同步写一次保证落盘
    session.stop();
    if !persist.lock().persist() {
        anyhow::bail!("设置写出失败: {}", path.display());
    }

    tracing::info!(
        "第 {} 次启动，窗口 {}x{}，最近文件 {} 个",
        settings.launches.get(),
        settings.width.get(),
        settings.height.get(),
        settings.recent.len()
    );
    Ok(())
}
