//! The expression graph.
//!
//! Nodes live in an arena and are addressed by `ExprId`. Every node keeps
//! back-references to its parents, one entry per child slot that points
//! at it, so a rewrite can substitute a node in all of its parents at
//! once. Nodes may be shared by several parents (the graph is a DAG).
//! Removed nodes stay in the arena, marked dead, so ids are never reused.

use super::node::{ExprId, ExprKind, SfwExpr, TableScan, VarExpr, VarKind};
use alloc::string::String;
use alloc::vec::Vec;
use shardql_core::{ExprType, Location};

/// A node of the expression graph.
#[derive(Clone, Debug)]
pub struct ExprNode {
    pub(crate) kind: ExprKind,
    pub(crate) parents: Vec<ExprId>,
    pub(crate) ty: Option<ExprType>,
    pub(crate) location: Option<Location>,
    pub(crate) live: bool,
}

impl ExprNode {
    #[inline]
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    #[inline]
    pub fn parents(&self) -> &[ExprId] {
        &self.parents
    }

    #[inline]
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Arena-allocated expression DAG.
#[derive(Clone, Debug, Default)]
pub struct ExprGraph {
    nodes: Vec<ExprNode>,
    root: Option<ExprId>,
    external_vars: Vec<ExprId>,
}

impl ExprGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and links it as a parent of each of its children.
    pub fn add(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        for child in kind.children() {
            self.nodes[child.index()].parents.push(id);
        }
        self.nodes.push(ExprNode {
            kind,
            parents: Vec::new(),
            ty: None,
            location: None,
            live: true,
        });
        id
    }

    /// Adds a node carrying a source location.
    pub fn add_at(&mut self, kind: ExprKind, location: Option<Location>) -> ExprId {
        let id = self.add(kind);
        self.nodes[id.index()].location = location;
        id
    }

    #[inline]
    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()].kind
    }

    /// Mutable access to a node's kind. Callers that change child slots
    /// must keep parent links consistent through `link` and `unlink`.
    #[inline]
    pub fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        &mut self.nodes[id.index()].kind
    }

    #[inline]
    pub fn parents(&self, id: ExprId) -> &[ExprId] {
        &self.nodes[id.index()].parents
    }

    #[inline]
    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        self.nodes[id.index()].kind.children()
    }

    #[inline]
    pub fn is_live(&self, id: ExprId) -> bool {
        self.nodes[id.index()].live
    }

    #[inline]
    pub fn location(&self, id: ExprId) -> Option<Location> {
        self.nodes[id.index()].location
    }

    pub fn set_location(&mut self, id: ExprId, location: Option<Location>) {
        self.nodes[id.index()].location = location;
    }

    #[inline]
    pub fn root(&self) -> Option<ExprId> {
        self.root
    }

    pub fn set_root(&mut self, root: ExprId) {
        self.root = Some(root);
    }

    /// Total number of nodes ever allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the ids of live nodes.
    pub fn live_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.live)
            .map(|(i, _)| ExprId(i as u32))
    }

    /// Records that `parent` references `child` from one more slot.
    pub fn link(&mut self, parent: ExprId, child: ExprId) {
        self.nodes[child.index()].parents.push(parent);
    }

    /// Removes one parent link from `child` to `parent`.
    pub fn unlink(&mut self, parent: ExprId, child: ExprId) {
        let parents = &mut self.nodes[child.index()].parents;
        if let Some(pos) = parents.iter().position(|p| *p == parent) {
            parents.swap_remove(pos);
        }
    }

    /// Substitutes `new` for `old` in every parent slot that points at
    /// `old`, transferring the parent links. When `destroy` is set, `old`
    /// and any descendants left without parents are removed.
    ///
    /// Returns `new`.
    pub fn replace(&mut self, old: ExprId, new: ExprId, destroy: bool) -> ExprId {
        if old == new {
            return new;
        }
        let mut parents = core::mem::take(&mut self.nodes[old.index()].parents);
        parents.sort_unstable();
        parents.dedup();
        for &parent in &parents {
            let mut slots = 0;
            self.nodes[parent.index()]
                .kind
                .for_each_child_mut(|slot| {
                    if *slot == old {
                        *slot = new;
                        slots += 1;
                    }
                });
            for _ in 0..slots {
                self.nodes[new.index()].parents.push(parent);
            }
        }
        if self.root == Some(old) {
            self.root = Some(new);
        }
        if destroy {
            self.destroy(old);
        }
        for parent in parents {
            self.refresh_type(parent);
        }
        new
    }

    /// Inserts a new node directly above `node`. `make` receives `node`
    /// and returns the kind of the new node, which must reference `node`.
    /// Every former parent of `node` is redirected to the new node.
    pub fn insert_above(&mut self, node: ExprId, make: impl FnOnce(ExprId) -> ExprKind) -> ExprId {
        let parents = core::mem::take(&mut self.nodes[node.index()].parents);
        let was_root = self.root == Some(node);
        let above = self.add(make(node));
        for parent in &parents {
            self.nodes[parent.index()].kind.for_each_child_mut(|slot| {
                if *slot == node {
                    *slot = above;
                }
            });
        }
        self.nodes[above.index()].parents = parents.clone();
        if was_root {
            self.root = Some(above);
        }
        for parent in parents {
            self.refresh_type(parent);
        }
        above
    }

    /// Removes a node that no longer has parents, then every descendant
    /// left without parents. Variables declared by removed query blocks
    /// and path steps are removed with them.
    pub fn destroy(&mut self, id: ExprId) {
        let mut work = alloc::vec![id];
        while let Some(id) = work.pop() {
            let node = &mut self.nodes[id.index()];
            if !node.live {
                continue;
            }
            node.live = false;
            node.parents.clear();
            let children = node.kind.children();
            let mut declared: Vec<ExprId> = node.kind.ctx_vars().to_vec();
            if let ExprKind::Sfw(sfw) = &node.kind {
                declared.extend(sfw.from.iter().map(|f| f.var));
            }
            for child in children {
                self.unlink(id, child);
                // Variables live as long as the node that declares them.
                let child_node = &self.nodes[child.index()];
                if child_node.parents.is_empty() && !matches!(child_node.kind, ExprKind::Var(_)) {
                    work.push(child);
                }
            }
            for var in declared {
                self.nodes[var.index()].live = false;
            }
        }
    }

    /// Returns the query block if `id` is one.
    pub fn sfw(&self, id: ExprId) -> Option<&SfwExpr> {
        match &self.nodes[id.index()].kind {
            ExprKind::Sfw(sfw) => Some(sfw),
            _ => None,
        }
    }

    pub fn sfw_mut(&mut self, id: ExprId) -> Option<&mut SfwExpr> {
        match &mut self.nodes[id.index()].kind {
            ExprKind::Sfw(sfw) => Some(sfw),
            _ => None,
        }
    }

    /// Returns the table scan if `id` is one.
    pub fn scan(&self, id: ExprId) -> Option<&TableScan> {
        match &self.nodes[id.index()].kind {
            ExprKind::BaseTable(scan) => Some(scan),
            _ => None,
        }
    }

    pub fn scan_mut(&mut self, id: ExprId) -> Option<&mut TableScan> {
        match &mut self.nodes[id.index()].kind {
            ExprKind::BaseTable(scan) => Some(scan),
            _ => None,
        }
    }

    /// Returns the variable if `id` is one.
    pub fn var(&self, id: ExprId) -> Option<&VarExpr> {
        match &self.nodes[id.index()].kind {
            ExprKind::Var(var) => Some(var),
            _ => None,
        }
    }

    pub(crate) fn var_mut(&mut self, id: ExprId) -> Option<&mut VarExpr> {
        match &mut self.nodes[id.index()].kind {
            ExprKind::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Returns the domain a FROM variable ranges over.
    pub fn var_domain(&self, var: ExprId) -> Option<ExprId> {
        let decl = self.var(var)?.decl?;
        self.sfw(decl)?
            .from
            .iter()
            .find(|f| f.var == var)
            .map(|f| f.domain)
    }

    /// Registers an external variable and returns its node.
    pub fn add_external_var(&mut self, name: impl Into<String>, declared: ExprType) -> ExprId {
        let id = self.external_vars.len();
        let var = self.add(ExprKind::Var(VarExpr {
            name: name.into(),
            kind: VarKind::External { id, declared },
            decl: None,
        }));
        self.external_vars.push(var);
        var
    }

    /// External variables in declaration order.
    #[inline]
    pub fn external_vars(&self) -> &[ExprId] {
        &self.external_vars
    }

    /// Returns the live query blocks in post order (inner blocks first).
    pub fn query_blocks(&self) -> Vec<ExprId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            let mut visited = hashbrown::HashSet::new();
            self.collect_blocks(root, &mut visited, &mut out);
        }
        out
    }

    fn collect_blocks(
        &self,
        id: ExprId,
        visited: &mut hashbrown::HashSet<ExprId>,
        out: &mut Vec<ExprId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for child in self.children(id) {
            self.collect_blocks(child, visited, out);
        }
        if matches!(self.kind(id), ExprKind::Sfw(_)) {
            out.push(id);
        }
    }

    /// Returns the top-level conjuncts of a query block's WHERE clause.
    pub fn where_conjuncts(&self, sfw: ExprId) -> Vec<ExprId> {
        let Some(pred) = self.sfw(sfw).and_then(|s| s.where_expr) else {
            return Vec::new();
        };
        match self.kind(pred) {
            ExprKind::FuncCall {
                func: crate::functions::FuncCode::OpAnd,
                args,
            } => args.clone(),
            _ => alloc::vec![pred],
        }
    }

    /// Rebuilds a query block's WHERE clause from the given conjuncts.
    ///
    /// The previous top-level AND (if any) is removed; conjuncts that are
    /// dropped and left without parents are destroyed.
    pub fn set_where(&mut self, sfw: ExprId, conjuncts: Vec<ExprId>) {
        let old = self.sfw(sfw).and_then(|s| s.where_expr);
        let old_conjuncts = self.where_conjuncts(sfw);
        if let Some(old) = old {
            self.unlink(sfw, old);
            if old_conjuncts.len() > 1 || old_conjuncts.first() != Some(&old) {
                // Detach the AND from its arguments without destroying them.
                for c in &old_conjuncts {
                    self.unlink(old, *c);
                }
                if let ExprKind::FuncCall { args, .. } = self.kind_mut(old) {
                    args.clear();
                }
                self.destroy(old);
            }
        }

        let new_where = match conjuncts.len() {
            0 => None,
            1 => Some(conjuncts[0]),
            _ => Some(self.add(ExprKind::FuncCall {
                func: crate::functions::FuncCode::OpAnd,
                args: conjuncts.clone(),
            })),
        };
        if let Some(w) = new_where {
            self.link(sfw, w);
        }
        if let Some(s) = self.sfw_mut(sfw) {
            s.where_expr = new_where;
        }
        for c in old_conjuncts {
            if !conjuncts.contains(&c) && self.parents(c).is_empty() {
                self.destroy(c);
            }
        }
    }

    /// Returns true if `id` is `ancestor` or one of its descendants.
    pub fn is_descendant_of(&self, id: ExprId, ancestor: ExprId) -> bool {
        let mut work = alloc::vec![ancestor];
        let mut visited = hashbrown::HashSet::new();
        while let Some(n) = work.pop() {
            if n == id {
                return true;
            }
            if visited.insert(n) {
                work.extend(self.children(n));
            }
        }
        false
    }

    /// Returns true if any node of the subtree rooted at `id` satisfies `f`.
    pub fn any_in_subtree(&self, id: ExprId, mut f: impl FnMut(ExprId, &ExprKind) -> bool) -> bool {
        let mut work = alloc::vec![id];
        let mut visited = hashbrown::HashSet::new();
        while let Some(n) = work.pop() {
            if !visited.insert(n) {
                continue;
            }
            if f(n, self.kind(n)) {
                return true;
            }
            work.extend(self.children(n));
        }
        false
    }
}
