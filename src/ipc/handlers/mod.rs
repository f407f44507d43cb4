pub mod builder;
pub mod core;
pub mod evaluate;
pub mod persist;
