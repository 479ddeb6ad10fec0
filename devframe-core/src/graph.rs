//! Page graph of a crawl: path-keys as nodes, discovered links as edges.

use crate::crawl::extract_url_path;
use devframe_scanner::result::CrawlResult;
use petgraph::Direction;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PageGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl PageGraph {
    /// Visited pages and their links, plus sitemap-only pages as unlinked nodes.
    pub fn from_result(result: &CrawlResult) -> Self {
        let mut graph = Self::default();

        for page in &result.pages {
            let from = graph.node(&page.path);
            for link in &page.links {
                let to = graph.node(link);
                graph.graph.update_edge(from, to, ());
            }
        }
        for url in &result.sitemap_urls {
            graph.node(&extract_url_path(url));
        }

        graph
    }

    fn node(&mut self, path: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.nodes.insert(path.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn has_link(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Pages nothing links to (the start page, and sitemap-only finds).
    pub fn orphans(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    /// Graphviz DOT source.
    pub fn to_dot(&self) -> String {
        let graph = self.graph.map(|_, node| node.clone(), |_, _| "");
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}
