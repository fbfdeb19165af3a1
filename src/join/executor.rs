use std::collections::HashMap;
use serde_json::Value;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Row;
use crate::core::utils::{distinct_non_null, resolve, set_path};
use crate::join::criteria::{FindFn, JoinCriteria};
use crate::join::graph::{JoinGraph, JoinNode, NodeId};
use crate::results::collection::ResultSet;
use crate::table::connection::TableConnection;
use crate::table::table::Table;

/// Where the executor reads tables from.
pub trait TableSource {
    fn table(&self, name: &str) -> Option<&Table>;
}

impl TableSource for HashMap<String, Table> {
    fn table(&self, name: &str) -> Option<&Table> {
        self.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Execute once from the most selective node before the final pass.
    pub reroot: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions { reroot: true }
    }
}

/// Runs a join plan against a table source.
pub struct JoinExecutor<'a, S: TableSource + ?Sized> {
    source: &'a S,
    options: JoinOptions,
    discovered: HashMap<NodeId, Vec<Value>>,
}

impl<'a, S: TableSource + ?Sized> JoinExecutor<'a, S> {
    pub fn new(source: &'a S, options: JoinOptions) -> Self {
        JoinExecutor {
            source,
            options,
            discovered: HashMap::new(),
        }
    }

    /// Primary keys each node resolved during the most recent pass.
    pub fn discovered(&self, id: NodeId) -> Option<&[Value]> {
        self.discovered.get(&id).map(Vec::as_slice)
    }

    /// Selectivity pass from the most selective node (output dropped),
    /// then the final pass from the requested root.
    pub fn execute(&mut self, graph: &JoinGraph) -> Result<Value> {
        if self.options.reroot {
            self.selectivity_pass(graph)?;
        }
        self.run(graph)
    }

    fn selectivity_pass(&mut self, graph: &JoinGraph) -> Result<()> {
        let Some(target) = graph.most_selective_node() else {
            return Ok(());
        };
        if target == graph.root() {
            return Ok(());
        }

        let rerooted = graph.rerooted(target);
        if rerooted.has_repeated_ancestor() {
            debug!(table = %graph.node(target).table, "skipping selectivity pass; reroot repeats a table");
            return Ok(());
        }
        debug!(table = %graph.node(target).table, "selectivity pass");
        self.run(&rerooted)?;
        Ok(())
    }

    fn run(&mut self, graph: &JoinGraph) -> Result<Value> {
        let root = graph.root();
        let node = graph.node(root);
        let mut rows = self.resolve(graph, root, None)?;
        node.sort.sort(&mut rows);

        Ok(match node.find_fn {
            FindFn::Find => Value::Array(rows),
            FindFn::FindOne => rows.into_iter().next().unwrap_or(Value::Null),
        })
    }

    fn table(&self, name: &str) -> Result<&'a Table> {
        let source: &'a S = self.source;
        source
            .table(name)
            .ok_or_else(|| Error::new(ErrorKind::TableNotFound, format!("no table named {}", name)))
    }

    /// Rows of one node with every child subtree nested in.
    fn resolve(
        &mut self,
        graph: &JoinGraph,
        id: NodeId,
        parent: Option<(&[Row], &TableConnection)>,
    ) -> Result<Vec<Row>> {
        let node = graph.node(id);
        let table = self.table(&node.table)?;

        let mut filter = node.filter.clone();
        if let Some((parent_rows, connection)) = parent {
            let key = &connection.join_key;
            if !filter.constrains(key) {
                let values = distinct_non_null(parent_rows.iter().map(|row| resolve(row, key)));
                filter = filter.is_in(key.clone(), values);
            }
        }

        let mut rows = table.find(Some(&filter)).into_rows();
        debug!(table = %node.table, rows = rows.len(), "resolved join node");

        for &child_id in &node.children {
            let child = graph.node(child_id);
            let child_table = self.table(&child.table)?;
            let connection = child_table
                .get_table_connection(&node.table)
                .cloned()
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::ConnectionNotFound,
                        format!("no connection from {} to {}", child.table, node.table),
                    )
                })?;

            let child_rows = self.resolve(graph, child_id, Some((rows.as_slice(), &connection)))?;
            rows = nest(rows, child, &connection, child_rows);
        }

        let primary_key = table.primary_key_field();
        let ids = distinct_non_null(rows.iter().map(|row| resolve(row, primary_key)));
        self.discovered.insert(id, ids);
        Ok(rows)
    }
}

/// Embed child rows into their parents at the child's alias.
fn nest(parents: Vec<Row>, child: &JoinNode, connection: &TableConnection, child_rows: Vec<Row>) -> Vec<Row> {
    let key = connection.join_key.as_str();
    let grouped = connection.join_type.is_grouped() && child.find_fn != FindFn::FindOne;
    let alias = match &child.alias {
        Some(alias) => alias.clone(),
        None if grouped => format!("{}s", child.table),
        None => child.table.clone(),
    };

    let children = ResultSet::new(child_rows);
    let mut nested: Vec<Row> = if grouped {
        let mut groups = children.into_group_by(key);
        for group in groups.values_mut() {
            child.sort.sort(group);
        }
        parents
            .into_iter()
            .map(|mut row| {
                let embedded = match resolve(&row, key) {
                    Value::Null => Vec::new(),
                    value => groups.lookup(value).cloned().unwrap_or_default(),
                };
                set_path(&mut row, &alias, Value::Array(embedded));
                row
            })
            .collect()
    } else {
        let index = children.into_index_by(key);
        parents
            .into_iter()
            .map(|mut row| {
                let embedded = match resolve(&row, key) {
                    Value::Null => Value::Null,
                    value => index.lookup(value).cloned().unwrap_or(Value::Null),
                };
                set_path(&mut row, &alias, embedded);
                row
            })
            .collect()
    };

    if child.filter_up {
        nested.retain(|row| match resolve(row, &alias) {
            Value::Null => false,
            Value::Array(items) => !items.is_empty(),
            _ => true,
        });
    }
    nested
}

/// Build and execute a join rooted at `root_table`.
pub fn nested_join<S: TableSource + ?Sized>(
    source: &S,
    root_table: &str,
    criteria: &JoinCriteria,
    options: JoinOptions,
) -> Result<Value> {
    let graph = JoinGraph::build(root_table, criteria)?;
    JoinExecutor::new(source, options).execute(&graph)
}
