pub mod compiler;
pub mod config;
pub mod error;
pub mod keys;
pub mod loader;
pub mod model;
pub mod publish;
pub mod sink;
pub mod training;
