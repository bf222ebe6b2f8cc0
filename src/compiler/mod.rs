pub mod actions;
pub mod actor;
pub mod dialog;
pub mod gather;
pub mod graph;
pub mod logic;
pub mod metadata;
pub mod trigger;

pub use actor::compile_actors;
pub use dialog::{DialogOptions, compile_dialog};
pub use metadata::compile_metadata;
pub use trigger::compile_triggers;
