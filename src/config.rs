//! 常量定义（消除魔法值）

/// 结构树的根哨兵键：顶层键都挂在它下面
pub const ROOT_KEY: &str = "";

/// 写出JSON时的缩进（3个空格）
pub const JSON_INDENT: &[u8] = b"   ";

/// 后台写线程名称
pub const WRITER_THREAD_NAME: &str = "json-marshaller-writer";

/// 演示程序默认的输出文件
pub const DEFAULT_DOCUMENT_FILE: &str = "settings.json";
