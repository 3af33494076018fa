pub mod base;
pub mod retry;
