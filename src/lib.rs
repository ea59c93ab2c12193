pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{
    openai::OpenAiClient,
    output::{format_graph, OutputFormat},
    storage::LocalStorage,
};
pub use core::{
    cache::CacheStatus,
    extractor::{Extraction, GraphExtractor},
    graph::Graph,
    session::ExtractionSession,
};
pub use utils::error::{ExtractError, Result};
