pub mod binding;
pub mod manager;
pub mod observable;
