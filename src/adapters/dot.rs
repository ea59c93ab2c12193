use crate::core::graph::RenderInstruction;
use crate::domain::model::DEFAULT_COLOR;

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn dot_line(instruction: &RenderInstruction) -> String {
    match instruction {
        RenderInstruction::DeclareNode { id, label, color } if color == DEFAULT_COLOR => {
            format!("\t{} [label={}]\n", quote(id), quote(label))
        }
        RenderInstruction::DeclareNode { id, label, color } => format!(
            "\t{} [label={} style=filled fillcolor={}]\n",
            quote(id),
            quote(label),
            quote(color)
        ),
        RenderInstruction::DeclareEdge {
            from,
            to,
            label,
            color,
        } if color == DEFAULT_COLOR => {
            format!("\t{} -> {} [label={}]\n", quote(from), quote(to), quote(label))
        }
        RenderInstruction::DeclareEdge {
            from,
            to,
            label,
            color,
        } => format!(
            "\t{} -> {} [label={} color={}]\n",
            quote(from),
            quote(to),
            quote(label),
            quote(color)
        ),
    }
}

/// 將渲染指令轉成 Graphviz DOT 文字；預設顏色不輸出顏色屬性
pub fn to_dot(instructions: &[RenderInstruction]) -> String {
    let mut out = String::from("// Knowledge Graph\ndigraph {\n");
    for instruction in instructions {
        out.push_str(&dot_line(instruction));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_and_edges_in_order() {
        let instructions = vec![
            RenderInstruction::DeclareNode {
                id: "rust".to_string(),
                label: "Rust (language)".to_string(),
                color: "#ffd8b1".to_string(),
            },
            RenderInstruction::DeclareNode {
                id: "cargo".to_string(),
                label: "Cargo (tool)".to_string(),
                color: DEFAULT_COLOR.to_string(),
            },
            RenderInstruction::DeclareEdge {
                from: "cargo".to_string(),
                to: "rust".to_string(),
                label: "builds".to_string(),
                color: DEFAULT_COLOR.to_string(),
            },
        ];

        assert_eq!(
            to_dot(&instructions),
            "// Knowledge Graph\ndigraph {\n\
             \t\"rust\" [label=\"Rust (language)\" style=filled fillcolor=\"#ffd8b1\"]\n\
             \t\"cargo\" [label=\"Cargo (tool)\"]\n\
             \t\"cargo\" -> \"rust\" [label=\"builds\"]\n\
             }\n"
        );
    }

    #[test]
    fn test_quotes_are_escaped() {
        let dot = to_dot(&[RenderInstruction::DeclareEdge {
            from: "a".to_string(),
            to: "b".to_string(),
            label: "says \"hi\"".to_string(),
            color: "red".to_string(),
        }]);
        assert!(dot.contains(r#"[label="says \"hi\"" color="red"]"#));
    }

    #[test]
    fn test_one_line_per_instruction() {
        let instructions = vec![
            RenderInstruction::DeclareNode {
                id: "c:\\tmp".to_string(),
                label: "Temp".to_string(),
                color: DEFAULT_COLOR.to_string(),
            };
            3
        ];
        let dot = to_dot(&instructions);
        assert_eq!(dot.lines().count(), 6);
        assert!(dot.contains("\t\"c:\\\\tmp\" [label=\"Temp\"]\n"));
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(to_dot(&[]), "// Knowledge Graph\ndigraph {\n}\n");
    }
}
