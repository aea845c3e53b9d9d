//! Arena-backed trees over a validated [`Grammar`].
//!
//! One [`TreeBuilder`] owns all nodes of one compilation unit. Children
//! are allocated strictly before the composites that reference them, so
//! every tree is topologically ordered and acyclic by construction;
//! traversal never needs cycle detection and teardown is dropping the
//! arena. [`TreeBuilder::freeze`] turns the arena into a read-only
//! [`Tree`]; nothing mutates a frozen tree, transformations rebuild into
//! a fresh arena instead (see [`crate::visit::Rebuilder`]).
//!
//! Construction-discipline violations (wrong arity, wrong field kind, a
//! handle from another arena, trivia on a constructor without the
//! capability) are bugs in the calling front end, not user input, and
//! panic with a description.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    intern::{Interner, Symbol},
    span::Span,
    schema::Multiplicity,
    trivia::TriviaNode,
    validate::{Ctor, CtorId, Grammar, ResolvedTy},
};

static NEXT_ARENA: AtomicU32 = AtomicU32::new(0);

/// Handle to a node. Carries the identity of the arena that produced it;
/// resolving it through any other arena panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    arena: u32,
    index: u32,
}

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriviaId(u32);

/// A single field slot value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Item {
    Node(NodeId),
    Identifier(Symbol),
    Str(Symbol),
    Int(i64),
    Bool(bool),
}

/// A field value, shaped by the field's declared multiplicity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    One(Item),
    Opt(Option<Item>),
    Seq(Box<[Item]>),
}

impl Value {
    #[inline]
    pub fn node(id: NodeId) -> Value {
        Value::One(Item::Node(id))
    }

    #[inline]
    pub fn ident(sym: Symbol) -> Value {
        Value::One(Item::Identifier(sym))
    }

    #[inline]
    pub fn int(v: i64) -> Value {
        Value::One(Item::Int(v))
    }

    #[inline]
    pub fn opt_node(id: Option<NodeId>) -> Value {
        Value::Opt(id.map(Item::Node))
    }

    #[inline]
    pub fn seq_nodes(ids: impl IntoIterator<Item = NodeId>) -> Value {
        Value::Seq(ids.into_iter().map(Item::Node).collect())
    }
}

struct Node {
    ctor: CtorId,
    fields: Box<[Value]>,
    span: Span,
    trivia: Option<TriviaId>,
}

/// Append-only arena for one tree under construction.
pub struct TreeBuilder<'g> {
    grammar: &'g Grammar,
    arena: u32,
    nodes: Vec<Node>,
    trivia: Vec<TriviaNode>,
    idents: Interner,
}

impl<'g> TreeBuilder<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            arena: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            trivia: Vec::new(),
            idents: Interner::new(),
        }
    }

    #[inline]
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// Interns an identifier or string payload for this arena.
    #[inline]
    pub fn intern(&mut self, s: &str) -> Symbol {
        self.idents.intern(s)
    }

    /// Allocates a node, checking the fields against the constructor's
    /// declared field list. Returns a handle usable as a child reference
    /// by any node allocated later in this arena.
    pub fn alloc(&mut self, ctor: CtorId, fields: Vec<Value>, span: Span) -> NodeId {
        let spec = self.grammar.ctor(ctor);
        if fields.len() != spec.fields.len() {
            panic!(
                "constructor '{}' takes {} field(s), got {}",
                self.grammar.resolve(spec.name),
                spec.fields.len(),
                fields.len()
            );
        }
        for (index, (field, value)) in spec.fields.iter().zip(&fields).enumerate() {
            self.check_field(spec, index, field.mult, field.ty, value);
        }

        let index = self.nodes.len() as u32;
        self.nodes.push(Node {
            ctor,
            fields: fields.into_boxed_slice(),
            span,
            trivia: None,
        });
        NodeId {
            arena: self.arena,
            index,
        }
    }

    /// [`Self::alloc`] by constructor name.
    pub fn alloc_named(&mut self, ctor: &str, fields: Vec<Value>, span: Span) -> NodeId {
        let Some(id) = self.grammar.lookup_ctor(ctor) else {
            panic!("no constructor named '{ctor}' in grammar '{}'", self.grammar.name());
        };
        self.alloc(id, fields, span)
    }

    /// Constructor of an already-allocated node.
    #[inline]
    pub fn ctor(&self, node: NodeId) -> CtorId {
        let index = self.check_handle(node);
        self.nodes[index].ctor
    }

    /// Attaches trivia to a statement-bearing node. The constructor must
    /// have the trivia capability (see [`Grammar::enable_trivia`]).
    pub fn attach_trivia(&mut self, node: NodeId, trivia: TriviaNode) {
        let index = self.check_handle(node);
        let ctor = self.nodes[index].ctor;
        if !self.grammar.carries_trivia(ctor) {
            panic!(
                "constructor '{}' does not carry trivia",
                self.grammar.resolve(self.grammar.ctor(ctor).name)
            );
        }

        let id = TriviaId(self.trivia.len() as u32);
        self.trivia.push(trivia);
        self.nodes[index].trivia = Some(id);
    }

    /// Freezes the arena. The result is read-only; the builder is gone.
    pub fn freeze(self, root: NodeId) -> Tree<'g> {
        self.check_handle(root);
        Tree {
            grammar: self.grammar,
            arena: self.arena,
            root,
            nodes: self.nodes,
            trivia: self.trivia,
            idents: self.idents,
        }
    }

    fn check_handle(&self, node: NodeId) -> usize {
        if node.arena != self.arena {
            panic!("handle belongs to a different arena");
        }
        // handles are only handed out by `alloc`, so the index is in
        // bounds whenever the arena matches
        debug_assert!(node.index() < self.nodes.len());
        node.index()
    }

    fn check_field(
        &self,
        spec: &Ctor,
        index: usize,
        mult: Multiplicity,
        ty: ResolvedTy,
        value: &Value,
    ) {
        let bad = |what: &str| {
            panic!(
                "field {index} of constructor '{}': {what}",
                self.grammar.resolve(spec.name)
            );
        };

        match (mult, value) {
            (Multiplicity::Required, Value::One(item)) => self.check_item(spec, index, ty, item),
            (Multiplicity::Optional, Value::Opt(item)) => {
                if let Some(item) = item {
                    self.check_item(spec, index, ty, item);
                }
            }
            (Multiplicity::Sequence, Value::Seq(items)) => {
                for item in items.iter() {
                    self.check_item(spec, index, ty, item);
                }
            }
            (Multiplicity::Required, _) => bad("expected a single value"),
            (Multiplicity::Optional, _) => bad("expected an optional value"),
            (Multiplicity::Sequence, _) => bad("expected a sequence value"),
        }
    }

    fn check_item(&self, spec: &Ctor, index: usize, ty: ResolvedTy, item: &Item) {
        let bad = |what: &str| {
            panic!(
                "field {index} of constructor '{}': {what}",
                self.grammar.resolve(spec.name)
            );
        };

        match (ty, item) {
            (ResolvedTy::Node(expected), Item::Node(id)) => {
                let node_index = self.check_handle(*id);
                let owner = self.grammar.ctor(self.nodes[node_index].ctor).owner;
                if owner != expected {
                    bad("child node has the wrong type");
                }
            }
            (ResolvedTy::Identifier, Item::Identifier(_)) => {}
            (ResolvedTy::String, Item::Str(_)) => {}
            (ResolvedTy::Int, Item::Int(_)) => {}
            (ResolvedTy::Bool, Item::Bool(_)) => {}
            _ => bad("item does not match the field's declared type"),
        }
    }
}

/// A frozen, read-only tree. Shared freely across threads for walking;
/// never mutated.
pub struct Tree<'g> {
    grammar: &'g Grammar,
    arena: u32,
    root: NodeId,
    nodes: Vec<Node>,
    trivia: Vec<TriviaNode>,
    idents: Interner,
}

impl<'g> Tree<'g> {
    #[inline]
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> &Node {
        if id.arena != self.arena {
            panic!("handle belongs to a different arena");
        }
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn ctor(&self, id: NodeId) -> CtorId {
        self.node(id).ctor
    }

    #[inline]
    pub fn ctor_name(&self, id: NodeId) -> &str {
        self.grammar.resolve(self.grammar.ctor(self.ctor(id)).name)
    }

    #[inline]
    pub fn fields(&self, id: NodeId) -> &[Value] {
        &self.node(id).fields
    }

    #[inline]
    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    #[inline]
    pub fn trivia(&self, id: NodeId) -> Option<&TriviaNode> {
        let id = self.node(id).trivia?;
        Some(&self.trivia[id.0 as usize])
    }

    /// Resolves an interned identifier or string payload.
    #[inline]
    pub fn ident(&self, sym: Symbol) -> &str {
        self.idents.resolve(sym)
    }

    /// Whether the optional field at `field` is present.
    pub fn is_present(&self, id: NodeId, field: usize) -> bool {
        match &self.fields(id)[field] {
            Value::Opt(item) => item.is_some(),
            Value::One(_) => true,
            Value::Seq(_) => panic!("is_present called on a sequence field"),
        }
    }

    /// Number of items in the sequence field at `field`.
    pub fn sequence_length(&self, id: NodeId, field: usize) -> usize {
        match &self.fields(id)[field] {
            Value::Seq(items) => items.len(),
            _ => panic!("sequence_length called on a non-sequence field"),
        }
    }

    /// Structural equality from the roots down, ignoring spans. Trivia
    /// is structure here: losslessness means comments and separators
    /// survive, so they take part in the comparison. Works across trees
    /// from different grammars by comparing names, not ids.
    pub fn structurally_eq(&self, other: &Tree<'_>) -> bool {
        self.node_eq(self.root, other, other.root)
    }

    fn node_eq(&self, a: NodeId, other: &Tree<'_>, b: NodeId) -> bool {
        if self.ctor_name(a) != other.ctor_name(b) {
            return false;
        }
        if self.trivia(a) != other.trivia(b) {
            return false;
        }

        let fa = self.fields(a);
        let fb = other.fields(b);
        if fa.len() != fb.len() {
            return false;
        }
        fa.iter().zip(fb).all(|(va, vb)| match (va, vb) {
            (Value::One(ia), Value::One(ib)) => self.item_eq(ia, other, ib),
            (Value::Opt(None), Value::Opt(None)) => true,
            (Value::Opt(Some(ia)), Value::Opt(Some(ib))) => self.item_eq(ia, other, ib),
            (Value::Seq(ia), Value::Seq(ib)) => {
                ia.len() == ib.len()
                    && ia
                        .iter()
                        .zip(ib.iter())
                        .all(|(ia, ib)| self.item_eq(ia, other, ib))
            }
            _ => false,
        })
    }

    fn item_eq(&self, a: &Item, other: &Tree<'_>, b: &Item) -> bool {
        match (a, b) {
            (Item::Node(a), Item::Node(b)) => self.node_eq(*a, other, *b),
            (Item::Identifier(a), Item::Identifier(b)) | (Item::Str(a), Item::Str(b)) => {
                self.ident(*a) == other.ident(*b)
            }
            (Item::Int(a), Item::Int(b)) => a == b,
            (Item::Bool(a), Item::Bool(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema, token::tokenize, validate::validate};

    fn toy() -> Grammar {
        let src = "module Toy {\n\
            stmt = Assign(identifier target, expr value) | If(expr test, stmt* body)\n\
            expr = Name(identifier id) | Num(int n) | Sub(expr base, expr? mask)\n\
            }";
        validate(schema::parse(&tokenize(src)).unwrap()).unwrap()
    }

    #[test]
    fn builds_and_reads_back_a_small_tree() {
        let g = toy();
        let mut b = TreeBuilder::new(&g);

        let x = b.intern("x");
        let name = b.alloc_named("Name", vec![Value::ident(x)], Span::empty());
        let num = b.alloc_named("Num", vec![Value::int(1)], Span::empty());
        let y = b.intern("y");
        let assign = b.alloc_named(
            "Assign",
            vec![Value::ident(y), Value::node(num)],
            Span::empty(),
        );
        let stmt_if = b.alloc_named(
            "If",
            vec![Value::node(name), Value::seq_nodes([assign])],
            Span::from(0usize..10),
        );

        let tree = b.freeze(stmt_if);
        assert_eq!(tree.ctor_name(tree.root()), "If");
        assert_eq!(tree.sequence_length(tree.root(), 1), 1);
        assert_eq!(tree.span(tree.root()), Span::from(0usize..10));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn absent_optional_reports_not_present() {
        let g = toy();
        let mut b = TreeBuilder::new(&g);
        let base = b.alloc_named("Num", vec![Value::int(0)], Span::empty());
        let sub = b.alloc_named(
            "Sub",
            vec![Value::node(base), Value::opt_node(None)],
            Span::empty(),
        );
        let tree = b.freeze(sub);
        assert!(!tree.is_present(tree.root(), 1));
        assert!(tree.is_present(tree.root(), 0));
    }

    #[test]
    #[should_panic(expected = "takes 2 field(s)")]
    fn wrong_arity_is_a_programming_error() {
        let g = toy();
        let mut b = TreeBuilder::new(&g);
        b.alloc_named("Assign", vec![Value::int(1)], Span::empty());
    }

    #[test]
    #[should_panic(expected = "wrong type")]
    fn wrong_child_type_is_a_programming_error() {
        let g = toy();
        let mut b = TreeBuilder::new(&g);
        let x = b.intern("x");
        let name = b.alloc_named("Name", vec![Value::ident(x)], Span::empty());
        // If.body wants stmt children, not expr
        b.alloc_named(
            "If",
            vec![Value::node(name), Value::seq_nodes([name])],
            Span::empty(),
        );
    }

    #[test]
    #[should_panic(expected = "different arena")]
    fn foreign_handles_are_rejected() {
        let g = toy();
        let mut a = TreeBuilder::new(&g);
        let mut b = TreeBuilder::new(&g);
        let num = a.alloc_named("Num", vec![Value::int(1)], Span::empty());
        let x = b.intern("x");
        b.alloc_named("Assign", vec![Value::ident(x), Value::node(num)], Span::empty());
    }

    #[test]
    fn structural_equality_ignores_spans() {
        let g = toy();

        let build = |span: Span| {
            let mut b = TreeBuilder::new(&g);
            let n = b.alloc_named("Num", vec![Value::int(7)], span);
            let base = b.alloc_named("Sub", vec![Value::node(n), Value::opt_node(None)], span);
            b.freeze(base)
        };

        let t1 = build(Span::empty());
        let t2 = build(Span::from(5usize..9));
        assert!(t1.structurally_eq(&t2));

        let mut b = TreeBuilder::new(&g);
        let n = b.alloc_named("Num", vec![Value::int(8)], Span::empty());
        let base = b.alloc_named(
            "Sub",
            vec![Value::node(n), Value::opt_node(None)],
            Span::empty(),
        );
        let t3 = b.freeze(base);
        assert!(!t1.structurally_eq(&t3));
    }
}
