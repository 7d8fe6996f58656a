//! Distribution pass: splits query blocks into a server part, which runs
//! on the partitions or shards, and a client part, which merges the
//! partial results.

use super::OptimizerPass;
use crate::context::Catalog;
use crate::expr::{
    DistributionKind, ExprGraph, ExprId, ExprKind, FromClause, ReceiveExpr, SelectField, SfwExpr,
    VarExpr, VarKind,
};
use crate::functions::FuncCode;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use shardql_core::{ItemType, Result, Value};
use tracing::debug;

/// Inserts a receive boundary above every query block that scans a table.
///
/// When the rows come from more than one partition and the block sorts,
/// windows or removes duplicates, the block is split: the server part
/// returns the sort and primary-key columns it needs, and a client block
/// above the receive re-projects the requested fields and applies the
/// offset and limit.
pub struct Distributor<'a> {
    catalog: &'a Catalog,
}

impl<'a> Distributor<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn distribute(&self, graph: &mut ExprGraph, sfw: ExprId, scan_id: ExprId) -> Result<()> {
        let Some(scan) = graph.scan(scan_id) else {
            return Ok(());
        };
        let distribution = if scan.single_partition {
            DistributionKind::SinglePartition
        } else if scan.is_primary() {
            DistributionKind::AllPartitions
        } else {
            DistributionKind::AllShards
        };
        let dedup = scan.eliminate_dups;
        let table = self.catalog.table(&scan.table)?;
        let pk: Vec<String> = table.primary_key().to_vec();

        let recv = graph.insert_above(sfw, |input| {
            ExprKind::Receive(ReceiveExpr::new(input, distribution))
        });
        debug!(block = %sfw, %distribution, "inserted receive");
        if distribution == DistributionKind::SinglePartition {
            return Ok(());
        }

        let Some(block) = graph.sfw(sfw) else {
            return Ok(());
        };
        let windowed = block.offset.is_some() || block.limit.is_some();
        if !(block.has_sort() || windowed || dedup) {
            return Ok(());
        }
        let Some(row_var) = block.first_var() else {
            return Ok(());
        };
        let was_star = block.select_star;
        let sort = block.sort.clone();

        expand_star(graph, sfw, row_var);
        let requested: Vec<String> = graph
            .sfw(sfw)
            .map(|b| b.select.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();

        let mut sort_positions = Vec::with_capacity(sort.len());
        for (k, key) in sort.iter().enumerate() {
            sort_positions.push(find_or_append(graph, sfw, key.expr, || format!("sort_gen{}", k)));
        }

        let mut pk_positions = Vec::new();
        if dedup {
            for (k, name) in pk.iter().enumerate() {
                let existing = graph.sfw(sfw).and_then(|b| {
                    b.select.iter().position(|f| {
                        matches!(graph.kind(f.expr),
                            ExprKind::FieldStep { input, name: n } if *input == row_var && n == name)
                    })
                });
                let pos = match existing {
                    Some(pos) => pos,
                    None => {
                        let field = graph.field(row_var, name.clone());
                        find_or_append(graph, sfw, field, || format!("pk_gen{}", k))
                    }
                };
                pk_positions.push(pos);
            }
        }

        // The server returns offset + limit rows; the client applies both.
        let (offset, limit) = match graph.sfw_mut(sfw) {
            Some(b) => (b.offset.take(), b.limit.take()),
            None => (None, None),
        };
        for e in offset.iter().chain(limit.iter()) {
            graph.unlink(sfw, *e);
        }
        let server_limit = match (offset, limit) {
            (Some(o), Some(l)) => Some(add_limits(graph, o, l)),
            (None, Some(l)) => Some(l),
            (_, None) => None,
        };
        if let Some(l) = server_limit {
            graph.link(sfw, l);
        }
        if let Some(b) = graph.sfw_mut(sfw) {
            b.limit = server_limit;
        }

        if let ExprKind::Receive(r) = graph.kind_mut(recv) {
            r.sort_positions = sort_positions;
            r.sort_specs = sort.iter().map(|k| k.spec).collect();
            r.pk_positions = pk_positions;
        }

        let client_var = graph.add(ExprKind::Var(VarExpr {
            name: String::from("$from"),
            kind: VarKind::TableRow,
            decl: None,
        }));
        let select: Vec<SelectField> = requested
            .iter()
            .map(|name| SelectField {
                name: name.clone(),
                expr: graph.field(client_var, name.clone()),
            })
            .collect();
        let client = graph.insert_above(recv, |input| {
            ExprKind::Sfw(SfwExpr {
                from: alloc::vec![FromClause {
                    domain: input,
                    var: client_var,
                }],
                select,
                offset,
                limit,
                ..SfwExpr::default()
            })
        });
        if let Some(v) = graph.var_mut(client_var) {
            v.decl = Some(client);
        }
        debug!(block = %sfw, client = %client, star = was_star, "split query block");

        graph.refresh_type(sfw);
        graph.refresh_type(client_var);
        graph.refresh_type(client);
        Ok(())
    }
}

impl OptimizerPass for Distributor<'_> {
    fn apply(&self, graph: &mut ExprGraph) -> Result<()> {
        for sfw in graph.query_blocks() {
            if !graph.is_live(sfw) {
                continue;
            }
            let Some(domain) = graph.sfw(sfw).and_then(|b| b.first_domain()) else {
                continue;
            };
            if matches!(graph.kind(domain), ExprKind::BaseTable(_)) {
                self.distribute(graph, sfw, domain)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "distributor"
    }
}

/// Replaces `SELECT *` with one field step per column of the row.
fn expand_star(graph: &mut ExprGraph, sfw: ExprId, row_var: ExprId) {
    if !graph.sfw(sfw).map_or(false, |b| b.select_star) {
        return;
    }
    let ItemType::Record(fields) = graph.expr_type(row_var).item else {
        return;
    };
    let mut select = Vec::with_capacity(fields.len());
    for (name, _) in fields {
        let expr = graph.field(row_var, name.clone());
        graph.link(sfw, expr);
        select.push(SelectField { name, expr });
    }
    if let Some(b) = graph.sfw_mut(sfw) {
        b.select = select;
        b.select_star = false;
    }
}

/// Returns the position of the select field computing `expr`, appending a
/// new field if there is none.
fn find_or_append(
    graph: &mut ExprGraph,
    sfw: ExprId,
    expr: ExprId,
    name: impl FnOnce() -> String,
) -> usize {
    let existing = graph
        .sfw(sfw)
        .and_then(|b| b.select.iter().position(|f| graph.match_exprs(f.expr, expr)));
    if let Some(pos) = existing {
        if graph.parents(expr).is_empty() {
            graph.destroy(expr);
        }
        return pos;
    }
    graph.link(sfw, expr);
    match graph.sfw_mut(sfw) {
        Some(b) => {
            b.select.push(SelectField { name: name(), expr });
            b.select.len() - 1
        }
        None => 0,
    }
}

fn add_limits(graph: &mut ExprGraph, offset: ExprId, limit: ExprId) -> ExprId {
    let literal = |e: ExprId| match graph.kind(e) {
        ExprKind::Const(v) => v.as_i64(),
        _ => None,
    };
    if let Some(sum) = literal(offset)
        .zip(literal(limit))
        .and_then(|(o, l)| o.checked_add(l))
    {
        return graph.constant(Value::Long(sum));
    }
    graph.func(FuncCode::OpAdd, alloc::vec![offset, limit])
}
