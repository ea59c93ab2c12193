pub mod cache;
pub mod cost;
pub mod extractor;
pub mod graph;
pub mod prompt;
pub mod repair;
pub mod session;
pub mod template;

pub use crate::domain::model::{Completion, Edge, Node, SamplingParams, Usage};
pub use crate::domain::ports::{ConfigProvider, Storage, TextGenerator};
pub use crate::utils::error::Result;
