//! 演示目标：内存中的有向图场景，以及操作它的四个命令
//!
//! 编排器本身不了解 Scene，命令通过 `Command<Scene>` 直接修改它。

use async_trait::async_trait;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::commands::{
    Command, CommandCatalog, CommandExample, CommandResult, ExecutionContext, NoArgs,
};
use crate::core::OrchestratorError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn id(&self) -> String {
        edge_id(&self.from, &self.to)
    }
}

fn edge_id(from: &str, to: &str) -> String {
    format!("{from}->{to}")
}

#[derive(Debug, Default)]
struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }
}

/// 场景图；节点与边保持插入顺序
#[derive(Debug, Default)]
pub struct Scene {
    graph: RwLock<Graph>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.graph.read().nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.graph.read().edges.clone()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.graph.read().nodes.iter().find(|n| n.id == id).cloned()
    }

    pub fn add_node(&self, id: &str, label: Option<&str>) -> Result<Node, String> {
        let mut graph = self.graph.write();
        if graph.has_node(id) {
            return Err(format!("Node '{id}' already exists"));
        }
        let node = Node {
            id: id.to_string(),
            label: label.unwrap_or(id).to_string(),
        };
        graph.nodes.push(node.clone());
        Ok(node)
    }

    pub fn connect(&self, from: &str, to: &str) -> Result<Edge, String> {
        let mut graph = self.graph.write();
        for id in [from, to] {
            if !graph.has_node(id) {
                return Err(format!("Node '{id}' does not exist"));
            }
        }
        if graph.edges.iter().any(|e| e.from == from && e.to == to) {
            return Err(format!("Edge {} already exists", edge_id(from, to)));
        }
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
        };
        graph.edges.push(edge.clone());
        Ok(edge)
    }

    /// 删除节点及其关联边，返回被删除的边
    pub fn remove_node(&self, id: &str) -> Result<Vec<Edge>, String> {
        let mut graph = self.graph.write();
        if !graph.has_node(id) {
            return Err(format!("Node '{id}' does not exist"));
        }
        graph.nodes.retain(|n| n.id != id);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) = graph
            .edges
            .drain(..)
            .partition(|e| e.from == id || e.to == id);
        graph.edges = kept;
        Ok(removed)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddNodeArgs {
    /// 节点唯一标识
    pub id: String,
    /// 显示名称，缺省为 id
    #[serde(default)]
    pub label: Option<String>,
}

pub struct AddNode;

#[async_trait]
impl Command<Scene> for AddNode {
    type Args = AddNodeArgs;

    fn name(&self) -> &str {
        "add_node"
    }

    fn description(&self) -> &str {
        "Add a node to the scene. Args: id (unique), optional label"
    }

    fn examples(&self) -> Vec<CommandExample> {
        vec![CommandExample::new(
            "add a node called server",
            json!({"id": "server", "label": "Server"}),
        )]
    }

    async fn execute(
        &self,
        scene: &Scene,
        args: AddNodeArgs,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<CommandResult> {
        Ok(match scene.add_node(&args.id, args.label.as_deref()) {
            Ok(node) => CommandResult::ok(format!("Added node '{}'", node.id))
                .with_data(json!(node))
                .with_nodes([node.id]),
            Err(e) => CommandResult::fail(e),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConnectArgs {
    pub from: String,
    pub to: String,
}

pub struct Connect;

#[async_trait]
impl Command<Scene> for Connect {
    type Args = ConnectArgs;

    fn name(&self) -> &str {
        "connect"
    }

    fn description(&self) -> &str {
        "Draw a directed edge between two existing nodes"
    }

    fn examples(&self) -> Vec<CommandExample> {
        vec![CommandExample::new(
            "link the client to the server",
            json!({"from": "client", "to": "server"}),
        )]
    }

    async fn execute(
        &self,
        scene: &Scene,
        args: ConnectArgs,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<CommandResult> {
        Ok(match scene.connect(&args.from, &args.to) {
            Ok(edge) => CommandResult::ok(format!("Connected {}", edge.id()))
                .with_nodes([edge.from.clone(), edge.to.clone()])
                .with_edges([edge.id()]),
            Err(e) => CommandResult::fail(e),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveNodeArgs {
    pub id: String,
}

pub struct RemoveNode;

#[async_trait]
impl Command<Scene> for RemoveNode {
    type Args = RemoveNodeArgs;

    fn name(&self) -> &str {
        "remove_node"
    }

    fn description(&self) -> &str {
        "Remove a node and every edge touching it"
    }

    async fn execute(
        &self,
        scene: &Scene,
        args: RemoveNodeArgs,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<CommandResult> {
        Ok(match scene.remove_node(&args.id) {
            Ok(edges) => CommandResult::ok(format!(
                "Removed node '{}' and {} edge(s)",
                args.id,
                edges.len()
            ))
            .with_nodes([args.id])
            .with_edges(edges.iter().map(Edge::id)),
            Err(e) => CommandResult::fail(e),
        })
    }
}

pub struct DescribeScene;

#[async_trait]
impl Command<Scene> for DescribeScene {
    type Args = NoArgs;

    fn name(&self) -> &str {
        "describe_scene"
    }

    fn description(&self) -> &str {
        "List every node and edge currently in the scene"
    }

    async fn execute(
        &self,
        scene: &Scene,
        _args: NoArgs,
        _ctx: &ExecutionContext,
    ) -> anyhow::Result<CommandResult> {
        let nodes = scene.nodes();
        let edges = scene.edges();
        let message = if nodes.is_empty() {
            "The scene is empty".to_string()
        } else {
            format!(
                "{} node(s): {}; {} edge(s)",
                nodes.len(),
                nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>().join(", "),
                edges.len()
            )
        };
        Ok(CommandResult::ok(message).with_data(json!({ "nodes": nodes, "edges": edges })))
    }
}

/// 注册全部演示命令
pub fn register_demo_commands(catalog: &CommandCatalog<Scene>) -> Result<(), OrchestratorError> {
    catalog.register(AddNode)?;
    catalog.register(Connect)?;
    catalog.register(RemoveNode)?;
    catalog.register(DescribeScene)?;
    Ok(())
}
