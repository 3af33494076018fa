pub mod base;
pub mod registry;
