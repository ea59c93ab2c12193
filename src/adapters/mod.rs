// Adapters layer: concrete implementations of the domain ports.

pub mod dot;
pub mod openai;
pub mod output;
pub mod storage;
