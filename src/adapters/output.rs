use crate::adapters::dot::to_dot;
use crate::core::graph::Graph;
use crate::utils::error::Result;

/// 擷取結果的輸出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// 力導向圖元件的 elements 結構
    #[default]
    Interactive,
    /// 靜態渲染指令
    Render,
    /// 驗證後的節點與邊
    Raw,
    /// Graphviz DOT 文字
    Dot,
}

pub fn format_graph(graph: &Graph, format: OutputFormat) -> Result<String> {
    let text = match format {
        OutputFormat::Interactive => serde_json::to_string_pretty(&graph.interactive())?,
        OutputFormat::Render => serde_json::to_string_pretty(&graph.rendering())?,
        OutputFormat::Raw => serde_json::to_string_pretty(&graph.raw())?,
        OutputFormat::Dot => to_dot(&graph.rendering()),
    };
    Ok(text)
}
