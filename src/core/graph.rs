use crate::domain::model::{Edge, GraphMetadata, Node, DEFAULT_COLOR};
use crate::utils::error::{EntryKind, ExtractError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// 建圖時被略過的單一條目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRejection {
    pub kind: EntryKind,
    pub index: usize,
    pub reason: String,
}

impl From<EntryRejection> for ExtractError {
    fn from(rejection: EntryRejection) -> Self {
        ExtractError::InvalidGraphEntry {
            kind: rejection.kind,
            index: rejection.index,
            reason: rejection.reason,
        }
    }
}

/// 建立後不可變；投影皆為唯讀視圖
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    metadata: Option<GraphMetadata>,
    rejections: Vec<EntryRejection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Element<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeData<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub color: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeData<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub label: &'a str,
    pub color: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Elements<'a> {
    pub nodes: Vec<Element<NodeData<'a>>>,
    pub edges: Vec<Element<EdgeData<'a>>>,
}

/// 力導向圖元件使用的格式
#[derive(Debug, Clone, Serialize)]
pub struct InteractiveProjection<'a> {
    pub elements: Elements<'a>,
}

/// 靜態圖表渲染指令，依序執行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderInstruction {
    DeclareNode {
        id: String,
        label: String,
        color: String,
    },
    DeclareEdge {
        from: String,
        to: String,
        label: String,
        color: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RawProjection<'a> {
    pub nodes: &'a [Node],
    pub edges: &'a [Edge],
}

fn field_text(entry: &Map<String, Value>, field: &str) -> Option<String> {
    match entry.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required(entry: &Map<String, Value>, field: &str) -> std::result::Result<String, String> {
    field_text(entry, field).ok_or_else(|| format!("missing field '{}'", field))
}

fn color_of(entry: &Map<String, Value>) -> String {
    field_text(entry, "color").unwrap_or_else(|| DEFAULT_COLOR.to_string())
}

fn node_from(value: &Value) -> std::result::Result<Node, String> {
    let entry = value.as_object().ok_or("entry is not an object")?;
    Ok(Node {
        id: required(entry, "id")?,
        label: required(entry, "label")?,
        node_type: required(entry, "type")?,
        color: color_of(entry),
    })
}

fn edge_from(value: &Value) -> std::result::Result<Edge, String> {
    let entry = value.as_object().ok_or("entry is not an object")?;
    Ok(Edge {
        from: required(entry, "from")?,
        to: required(entry, "to")?,
        relationship: required(entry, "relationship")?,
        color: color_of(entry),
    })
}

fn collection<'a>(document: &'a Map<String, Value>, key: &str) -> Result<&'a [Value]> {
    match document.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => {
            tracing::warn!("⚠️ Graph document has no '{}' collection, treating as empty", key);
            Ok(&[])
        }
        Some(other) => Err(ExtractError::InvalidDocument {
            reason: format!("'{}' must be an array, found {}", key, json_type(other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Graph {
    /// 逐條驗證；單一條目無效只會被略過，不會讓整批失敗。
    /// 邊的端點不檢查是否對應已宣告的節點。
    pub fn build(document: &Value) -> Result<Self> {
        let root = document.as_object().ok_or_else(|| ExtractError::InvalidDocument {
            reason: format!("expected an object, found {}", json_type(document)),
        })?;

        let mut rejections = Vec::new();
        let mut seen_ids = HashSet::new();

        let mut nodes = Vec::new();
        for (index, value) in collection(root, "nodes")?.iter().enumerate() {
            let outcome = node_from(value).and_then(|node| {
                if seen_ids.insert(node.id.clone()) {
                    Ok(node)
                } else {
                    Err(format!("duplicate node id '{}'", node.id))
                }
            });
            match outcome {
                Ok(node) => nodes.push(node),
                Err(reason) => rejections.push(EntryRejection {
                    kind: EntryKind::Node,
                    index,
                    reason,
                }),
            }
        }

        let mut edges = Vec::new();
        for (index, value) in collection(root, "edges")?.iter().enumerate() {
            match edge_from(value) {
                Ok(edge) => edges.push(edge),
                Err(reason) => rejections.push(EntryRejection {
                    kind: EntryKind::Edge,
                    index,
                    reason,
                }),
            }
        }

        for rejection in &rejections {
            let error = ExtractError::from(rejection.clone());
            tracing::warn!("⚠️ Skipping entry: {}", error);
        }

        let metadata = root
            .get("metadata")
            .and_then(|m| serde_json::from_value::<GraphMetadata>(m.clone()).ok());

        tracing::debug!(
            "🧩 Built graph: {} nodes, {} edges, {} rejected",
            nodes.len(),
            edges.len(),
            rejections.len()
        );

        Ok(Self {
            nodes,
            edges,
            metadata,
            rejections,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn metadata(&self) -> Option<&GraphMetadata> {
        self.metadata.as_ref()
    }

    pub fn rejections(&self) -> &[EntryRejection] {
        &self.rejections
    }

    pub fn interactive(&self) -> InteractiveProjection<'_> {
        InteractiveProjection {
            elements: Elements {
                nodes: self
                    .nodes
                    .iter()
                    .map(|node| Element {
                        data: NodeData {
                            id: &node.id,
                            label: &node.label,
                            color: &node.color,
                        },
                    })
                    .collect(),
                edges: self
                    .edges
                    .iter()
                    .map(|edge| Element {
                        data: EdgeData {
                            source: &edge.from,
                            target: &edge.to,
                            label: &edge.relationship,
                            color: &edge.color,
                        },
                    })
                    .collect(),
            },
        }
    }

    /// 先宣告所有節點，再宣告所有邊
    pub fn rendering(&self) -> Vec<RenderInstruction> {
        let nodes = self.nodes.iter().map(|node| RenderInstruction::DeclareNode {
            id: node.id.clone(),
            label: format!("{} ({})", node.label, node.node_type),
            color: node.color.clone(),
        });
        let edges = self.edges.iter().map(|edge| RenderInstruction::DeclareEdge {
            from: edge.from.clone(),
            to: edge.to.clone(),
            label: edge.relationship.clone(),
            color: edge.color.clone(),
        });
        nodes.chain(edges).collect()
    }

    pub fn raw(&self) -> RawProjection<'_> {
        RawProjection {
            nodes: &self.nodes,
            edges: &self.edges,
        }
    }
}
