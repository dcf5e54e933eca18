pub mod document;
pub mod error;
pub mod key_handle;
pub mod marshaller;
pub mod navigation;
pub mod protocol;
pub mod structure;
