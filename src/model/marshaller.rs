//! 模型编组器：写 = 结构生成空白文档 → 写分发器填值 → 协议写出；
//! 读 = 协议取文档 → 兼容性检查 → 读分发器回填模型

use crate::model::error::{MarshalError, StructureError};
use crate::model::navigation::Navigator;
use crate::model::protocol::PersistenceProtocol;
use crate::model::structure::StructureTree;

/// 一次读取的结果；任何分支都不会向模型层抛错
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 文档已回填到模型
    Applied,
    /// 协议没有给出文档（不存在或已损坏）
    NotFound,
    /// 文档形状与结构不兼容，模型未改动
    Incompatible,
}

/// 后台写线程调用的写入能力
pub trait Persist: Send {
    fn persist(&mut self) -> bool;
}

impl<F: FnMut() -> bool + Send> Persist for F {
    fn persist(&mut self) -> bool {
        self()
    }
}

/// 固定结构、固定协议的编组器
pub struct ModelMarshaller {
    structure: StructureTree,
    reader: Navigator,
    writer: Navigator,
    protocol: Box<dyn PersistenceProtocol>,
}

impl std::fmt::Debug for ModelMarshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMarshaller")
            .field("structure", &self.structure)
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl ModelMarshaller {
    pub fn builder() -> MarshallerBuilder {
        MarshallerBuilder::default()
    }

    /// 每次调用恰好一次协议写
    pub fn write(&mut self) -> bool {
        let mut document = self.structure.build();
        self.writer.parse(&mut document);
        let ok = self.protocol.write_to_location(&document);
        if ok {
            tracing::info!("模型已写出");
        } else {
            tracing::error!("模型写出失败");
        }
        ok
    }

    pub fn read(&mut self) -> ReadOutcome {
        let Some(mut document) = self.protocol.read_from_location() else {
            tracing::info!("未读取到文档，模型保持不变");
            return ReadOutcome::NotFound;
        };
        if !self.structure.is_compatible(&document) {
            tracing::warn!("文档形状与结构不兼容，跳过读取");
            return ReadOutcome::Incompatible;
        }
        self.reader.parse(&mut document);
        tracing::info!("文档已回填到模型");
        ReadOutcome::Applied
    }
}

impl Persist for ModelMarshaller {
    fn persist(&mut self) -> bool {
        self.write()
    }
}

#[derive(Default)]
pub struct MarshallerBuilder {
    structure: Option<StructureTree>,
    reader: Option<Navigator>,
    writer: Option<Navigator>,
    protocol: Option<Box<dyn PersistenceProtocol>>,
}

impl MarshallerBuilder {
    pub fn structure(mut self, structure: StructureTree) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn reader(mut self, reader: Navigator) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn writer(mut self, writer: Navigator) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn protocol(mut self, protocol: impl PersistenceProtocol + 'static) -> Self {
        self.protocol = Some(Box::new(protocol));
        self
    }

    pub fn build(self) -> Result<ModelMarshaller, MarshalError> {
        Ok(ModelMarshaller {
            structure: self.structure.ok_or(MarshalError::MissingDependency("structure"))?,
            reader: self.reader.ok_or(MarshalError::MissingDependency("reader"))?,
            writer: self.writer.ok_or(MarshalError::MissingDependency("writer"))?,
            protocol: self.protocol.ok_or(MarshalError::MissingDependency("protocol"))?,
        })
    }
}

type StructureSupplier = Box<dyn FnMut() -> Result<StructureTree, StructureError> + Send>;

/// 动态编组器：结构在每次写出时重新求值，协议按调用传入。
/// 读取时不做兼容性检查。
pub struct DynamicMarshaller {
    structure: StructureSupplier,
    reader: Navigator,
    writer: Navigator,
}

impl std::fmt::Debug for DynamicMarshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMarshaller")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl DynamicMarshaller {
    pub fn builder() -> DynamicMarshallerBuilder {
        DynamicMarshallerBuilder::default()
    }

    /// 结构求值失败时不触碰协议，返回 `false`
    pub fn write(&mut self, protocol: &dyn PersistenceProtocol) -> bool {
        let structure = match (self.structure)() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("{}，本次不写出", MarshalError::from(e));
                return false;
            }
        };
        let mut document = structure.build();
        self.writer.parse(&mut document);
        let ok = protocol.write_to_location(&document);
        if ok {
            tracing::info!("模型已写出（动态结构）");
        } else {
            tracing::error!("模型写出失败（动态结构）");
        }
        ok
    }

    pub fn read(&mut self, protocol: &dyn PersistenceProtocol) -> ReadOutcome {
        let Some(mut document) = protocol.read_from_location() else {
            tracing::info!("未读取到文档，模型保持不变");
            return ReadOutcome::NotFound;
        };
        self.reader.parse(&mut document);
        ReadOutcome::Applied
    }
}

#[derive(Default)]
pub struct DynamicMarshallerBuilder {
    structure: Option<StructureSupplier>,
    reader: Option<Navigator>,
    writer: Option<Navigator>,
}

impl DynamicMarshallerBuilder {
    pub fn structure_with(
        mut self,
        supplier: impl FnMut() -> Result<StructureTree, StructureError> + Send + 'static,
    ) -> Self {
        self.structure = Some(Box::new(supplier));
        self
    }

    pub fn reader(mut self, reader: Navigator) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn writer(mut self, writer: Navigator) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn build(self) -> Result<DynamicMarshaller, MarshalError> {
        Ok(DynamicMarshaller {
            structure: self.structure.ok_or(MarshalError::MissingDependency("structure"))?,
            reader: self.reader.ok_or(MarshalError::MissingDependency("reader"))?,
            writer: self.writer.ok_or(MarshalError::MissingDependency("writer"))?,
        })
    }
}
