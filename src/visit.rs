//! Double dispatch over trees.
//!
//! A visitor instance is a set of operations, one per constructor of the
//! grammar, registered by name and sealed by `finish`. Sealing fails if
//! any constructor lacks an operation, so adding a constructor to the
//! schema breaks every existing visitor until it addresses the new case.
//! That is the main safety property this module exists to provide.
//!
//! Two shapes:
//! - [`Walker`]: non-mutating; operations may recurse via
//!   [`Walker::walk_children`] and accumulate external state. Frozen
//!   trees may be walked concurrently.
//! - [`Rebuilder`]: every operation returns a replacement node allocated
//!   in a fresh arena; the source arena is never touched, so a lowering
//!   pass yields a new tree generation instead of mutating in place.

use crate::{
    error::{Error, ErrorKind},
    span::Span,
    tree::{Item, NodeId, Tree, TreeBuilder, Value},
    validate::Grammar,
};

/// Depth-first preorder walk in declared field order. Absent optional
/// fields are skipped entirely: `visit` is never invoked with a
/// placeholder for them.
pub fn walk(tree: &Tree<'_>, node: NodeId, visit: &mut impl FnMut(&Tree<'_>, NodeId)) {
    visit(tree, node);
    for value in tree.fields(node) {
        match value {
            Value::One(Item::Node(child)) | Value::Opt(Some(Item::Node(child))) => {
                walk(tree, *child, visit);
            }
            Value::Seq(items) => {
                for item in items.iter() {
                    if let Item::Node(child) = item {
                        walk(tree, *child, visit);
                    }
                }
            }
            _ => {}
        }
    }
}

type WalkOp<'g, S> = Box<dyn Fn(&Walker<'g, S>, &Tree<'g>, NodeId, &mut S) + 'g>;

/// A sealed, exhaustive set of non-mutating per-constructor operations.
pub struct Walker<'g, S> {
    grammar: &'g Grammar,
    ops: Box<[WalkOp<'g, S>]>,
}

impl<'g, S> core::fmt::Debug for Walker<'g, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Walker")
            .field("grammar", &self.grammar)
            .finish_non_exhaustive()
    }
}

impl<'g, S> Walker<'g, S> {
    pub fn builder(grammar: &'g Grammar) -> WalkerBuilder<'g, S> {
        WalkerBuilder {
            grammar,
            ops: (0..grammar.num_ctors()).map(|_| None).collect(),
            errors: Vec::new(),
        }
    }

    #[inline]
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// Invokes exactly the operation registered for `node`'s constructor.
    pub fn dispatch(&self, tree: &Tree<'g>, node: NodeId, state: &mut S) {
        let op = &self.ops[tree.ctor(node).index()];
        op(self, tree, node, state);
    }

    /// Dispatches every child node in declared field order, skipping
    /// absent optionals and scalar fields.
    pub fn walk_children(&self, tree: &Tree<'g>, node: NodeId, state: &mut S) {
        for value in tree.fields(node) {
            match value {
                Value::One(Item::Node(child)) | Value::Opt(Some(Item::Node(child))) => {
                    self.dispatch(tree, *child, state);
                }
                Value::Seq(items) => {
                    for item in items.iter() {
                        if let Item::Node(child) = item {
                            self.dispatch(tree, *child, state);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

pub struct WalkerBuilder<'g, S> {
    grammar: &'g Grammar,
    ops: Vec<Option<WalkOp<'g, S>>>,
    errors: Vec<Error>,
}

impl<'g, S: 'g> WalkerBuilder<'g, S> {
    /// Registers the operation for `ctor`. Unknown or doubly-registered
    /// constructors are reported when the set is sealed.
    pub fn on(
        mut self,
        ctor: &str,
        op: impl Fn(&Walker<'g, S>, &Tree<'g>, NodeId, &mut S) + 'g,
    ) -> Self {
        match self.grammar.lookup_ctor(ctor) {
            Some(id) => {
                if self.ops[id.index()].is_some() {
                    self.errors.push(Error::new(
                        ErrorKind::DuplicateDeclaration,
                        format!("operation for constructor '{ctor}' registered twice"),
                        Span::empty(),
                    ));
                }
                self.ops[id.index()] = Some(Box::new(op));
            }
            None => self.errors.push(Error::new(
                ErrorKind::UnresolvedType,
                format!("no constructor named '{ctor}' in grammar '{}'", self.grammar.name()),
                Span::empty(),
            )),
        }
        self
    }

    /// Registers `op` for every constructor that has no operation yet.
    pub fn fallback(mut self, op: fn(&Walker<'g, S>, &Tree<'g>, NodeId, &mut S)) -> Self {
        for slot in self.ops.iter_mut() {
            if slot.is_none() {
                *slot = Some(Box::new(op));
            }
        }
        self
    }

    /// Seals the set. Fails unless every constructor of the grammar has
    /// exactly one operation.
    pub fn finish(self) -> Result<Walker<'g, S>, Vec<Error>> {
        let Self {
            grammar,
            ops,
            mut errors,
        } = self;

        let mut sealed = Vec::with_capacity(ops.len());
        for (index, slot) in ops.into_iter().enumerate() {
            match slot {
                Some(op) => sealed.push(op),
                None => {
                    let id = grammar.ctor_ids().nth(index).expect("index in range");
                    errors.push(Error::new(
                        ErrorKind::IncompleteVisitor,
                        format!(
                            "visitor has no operation for constructor '{}'",
                            grammar.resolve(grammar.ctor(id).name)
                        ),
                        Span::empty(),
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Walker {
            grammar,
            ops: sealed.into_boxed_slice(),
        })
    }
}

type RebuildOp<'g> = Box<dyn Fn(&Rebuilder<'g>, &Tree<'g>, NodeId, &mut TreeBuilder<'g>) -> NodeId + 'g>;

/// A sealed, exhaustive rebuilding transformer. Running it against a
/// frozen tree produces a new tree in a new arena; the source tree is
/// read, never written.
pub struct Rebuilder<'g> {
    grammar: &'g Grammar,
    ops: Box<[RebuildOp<'g>]>,
}

impl<'g> Rebuilder<'g> {
    pub fn builder(grammar: &'g Grammar) -> RebuilderBuilder<'g> {
        RebuilderBuilder {
            grammar,
            ops: (0..grammar.num_ctors()).map(|_| None).collect(),
            errors: Vec::new(),
        }
    }

    /// A builder with the structure-preserving operation pre-registered
    /// for every constructor. Lowering passes start here and override
    /// only the constructors they rewrite.
    pub fn identity(grammar: &'g Grammar) -> RebuilderBuilder<'g> {
        let mut builder = Self::builder(grammar);
        for slot in builder.ops.iter_mut() {
            *slot = Some(Box::new(|r: &Rebuilder<'g>, tree, node, out| {
                r.rebuild_node(tree, node, out)
            }));
        }
        builder
    }

    pub fn run(&self, tree: &Tree<'g>) -> Tree<'g> {
        let mut out = TreeBuilder::new(self.grammar);
        let root = self.rebuild(tree, tree.root(), &mut out);
        out.freeze(root)
    }

    /// Dispatches the operation registered for `node`'s constructor.
    pub fn rebuild(&self, tree: &Tree<'g>, node: NodeId, out: &mut TreeBuilder<'g>) -> NodeId {
        let op = &self.ops[tree.ctor(node).index()];
        op(self, tree, node, out)
    }

    /// The structure-preserving rebuild: children rebuilt through
    /// dispatch, then the same constructor reallocated with the same
    /// span and trivia.
    pub fn rebuild_node(&self, tree: &Tree<'g>, node: NodeId, out: &mut TreeBuilder<'g>) -> NodeId {
        let fields = self.rebuild_fields(tree, node, out);
        let id = out.alloc(tree.ctor(node), fields, tree.span(node));
        if let Some(trivia) = tree.trivia(node) {
            out.attach_trivia(id, trivia.clone());
        }
        id
    }

    /// Rebuilds every field value of `node` into `out`, in declared
    /// order.
    pub fn rebuild_fields(
        &self,
        tree: &Tree<'g>,
        node: NodeId,
        out: &mut TreeBuilder<'g>,
    ) -> Vec<Value> {
        tree.fields(node)
            .iter()
            .map(|value| match value {
                Value::One(item) => Value::One(self.rebuild_item(tree, item, out)),
                Value::Opt(None) => Value::Opt(None),
                Value::Opt(Some(item)) => Value::Opt(Some(self.rebuild_item(tree, item, out))),
                Value::Seq(items) => Value::Seq(
                    items
                        .iter()
                        .map(|item| self.rebuild_item(tree, item, out))
                        .collect(),
                ),
            })
            .collect()
    }

    fn rebuild_item(&self, tree: &Tree<'g>, item: &Item, out: &mut TreeBuilder<'g>) -> Item {
        match item {
            Item::Node(child) => Item::Node(self.rebuild(tree, *child, out)),
            Item::Identifier(sym) => Item::Identifier(out.intern(tree.ident(*sym))),
            Item::Str(sym) => Item::Str(out.intern(tree.ident(*sym))),
            Item::Int(v) => Item::Int(*v),
            Item::Bool(v) => Item::Bool(*v),
        }
    }
}

pub struct RebuilderBuilder<'g> {
    grammar: &'g Grammar,
    ops: Vec<Option<RebuildOp<'g>>>,
    errors: Vec<Error>,
}

impl<'g> RebuilderBuilder<'g> {
    pub fn on(
        mut self,
        ctor: &str,
        op: impl Fn(&Rebuilder<'g>, &Tree<'g>, NodeId, &mut TreeBuilder<'g>) -> NodeId + 'g,
    ) -> Self {
        match self.grammar.lookup_ctor(ctor) {
            Some(id) => self.ops[id.index()] = Some(Box::new(op)),
            None => self.errors.push(Error::new(
                ErrorKind::UnresolvedType,
                format!("no constructor named '{ctor}' in grammar '{}'", self.grammar.name()),
                Span::empty(),
            )),
        }
        self
    }

    pub fn finish(self) -> Result<Rebuilder<'g>, Vec<Error>> {
        let Self {
            grammar,
            ops,
            mut errors,
        } = self;

        let mut sealed = Vec::with_capacity(ops.len());
        for (index, slot) in ops.into_iter().enumerate() {
            match slot {
                Some(op) => sealed.push(op),
                None => {
                    let id = grammar.ctor_ids().nth(index).expect("index in range");
                    errors.push(Error::new(
                        ErrorKind::IncompleteVisitor,
                        format!(
                            "visitor has no operation for constructor '{}'",
                            grammar.resolve(grammar.ctor(id).name)
                        ),
                        Span::empty(),
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Rebuilder {
            grammar,
            ops: sealed.into_boxed_slice(),
        })
    }
}
