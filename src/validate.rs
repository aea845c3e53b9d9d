//! Closes a parsed [`Module`] into a [`Grammar`]: every type reference
//! resolved, duplicates and unterminating recursion rejected, and every
//! constructor assigned a dense discriminant in declaration order.
//!
//! All semantic errors found in one pass are batched into a single `Vec`
//! rather than stopping at the first, since validation has no side
//! effects to unwind.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    error::{Error, ErrorKind},
    intern::{Interner, Symbol},
    schema::{Module, Multiplicity, TypeDef, TypeRef},
    span::Span,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CtorId(u32);

impl CtorId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The constructor's stable discriminant. Declaration order within
    /// the module; part of the public contract for anything serialized
    /// atop it, so it never changes for an unchanged schema.
    #[inline]
    pub fn discriminant(self) -> u16 {
        self.0 as u16
    }
}

/// A closed, validated grammar. This is the instantiated node-type
/// system: construction and dispatch are checked against it.
#[derive(Debug)]
pub struct Grammar {
    name: Symbol,
    types: Vec<Type>,
    ctors: Vec<Ctor>,
    ctor_by_name: HashMap<Symbol, CtorId, FxBuildHasher>,
    type_by_name: HashMap<Symbol, TypeId, FxBuildHasher>,
    trivia_ok: Vec<bool>,
    interner: Interner,
}

#[derive(Debug)]
pub struct Type {
    pub name: Symbol,
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Debug)]
pub enum TypeKind {
    Sum { ctors: Vec<CtorId> },
    /// A product is its own single anonymous constructor, registered
    /// under the type's name.
    Product { ctor: CtorId },
}

#[derive(Debug)]
pub struct Ctor {
    pub name: Symbol,
    pub owner: TypeId,
    pub fields: Vec<FieldSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: Option<Symbol>,
    pub ty: ResolvedTy,
    pub mult: Multiplicity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedTy {
    Identifier,
    Int,
    String,
    Bool,
    Node(TypeId),
}

impl Grammar {
    #[inline]
    pub fn name(&self) -> &str {
        self.interner.resolve(self.name)
    }

    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    #[inline]
    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn num_ctors(&self) -> usize {
        self.ctors.len()
    }

    #[inline]
    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    #[inline]
    pub fn ctor(&self, id: CtorId) -> &Ctor {
        &self.ctors[id.index()]
    }

    pub fn ctor_ids(&self) -> impl Iterator<Item = CtorId> + '_ {
        (0..self.ctors.len() as u32).map(CtorId)
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        let sym = self.interner.get(name)?;
        self.type_by_name.get(&sym).copied()
    }

    pub fn lookup_ctor(&self, name: &str) -> Option<CtorId> {
        let sym = self.interner.get(name)?;
        self.ctor_by_name.get(&sym).copied()
    }

    /// Index of the field called `name` in `ctor`'s declared field list.
    pub fn field_index(&self, ctor: CtorId, name: &str) -> Option<usize> {
        let sym = self.interner.get(name)?;
        self.ctor(ctor)
            .fields
            .iter()
            .position(|f| f.name == Some(sym))
    }

    /// Marks every constructor of the named sum type as trivia-bearing.
    ///
    /// Trivia is a per-node-kind capability decided here, once, before
    /// any tree is built, so node kinds that never carry trivia pay
    /// nothing for it.
    pub fn enable_trivia(&mut self, type_name: &str) -> Result<(), Error> {
        let Some(id) = self.lookup_type(type_name) else {
            return Err(Error::new(
                ErrorKind::UnresolvedType,
                format!("cannot enable trivia: no type named '{type_name}'"),
                Span::empty(),
            ));
        };

        match &self.types[id.index()].kind {
            TypeKind::Sum { ctors } => {
                for &ctor in ctors {
                    self.trivia_ok[ctor.index()] = true;
                }
                Ok(())
            }
            TypeKind::Product { .. } => Err(Error::new(
                ErrorKind::UnresolvedType,
                format!("cannot enable trivia on product type '{type_name}'"),
                self.types[id.index()].span,
            )),
        }
    }

    #[inline]
    pub fn carries_trivia(&self, ctor: CtorId) -> bool {
        self.trivia_ok[ctor.index()]
    }
}

pub fn validate(module: Module) -> Result<Grammar, Vec<Error>> {
    let (name, decls, interner) = module.into_parts();
    let mut errors = Vec::new();

    // Pass 1: register type and constructor names, assign dense
    // constructor ids in declaration order.
    let mut type_by_name: HashMap<Symbol, TypeId, FxBuildHasher> = HashMap::default();
    let mut ctor_by_name: HashMap<Symbol, CtorId, FxBuildHasher> = HashMap::default();
    let mut types = Vec::with_capacity(decls.len());
    let mut ctor_names = Vec::new();

    for decl in &decls {
        let type_id = TypeId(types.len() as u32);
        if type_by_name.insert(*decl.name, type_id).is_some() {
            errors.push(Error::new(
                ErrorKind::DuplicateDeclaration,
                format!("type '{}' is declared twice", interner.resolve(*decl.name)),
                decl.name.span,
            ));
        }

        let kind = match &decl.def {
            TypeDef::Sum { ctors, .. } => {
                let mut ids = Vec::with_capacity(ctors.len());
                for ctor in ctors {
                    let ctor_id = CtorId(ctor_names.len() as u32);
                    if ctor_by_name.insert(*ctor.name, ctor_id).is_some() {
                        errors.push(Error::new(
                            ErrorKind::DuplicateDeclaration,
                            format!(
                                "constructor '{}' is declared twice",
                                interner.resolve(*ctor.name)
                            ),
                            ctor.name.span,
                        ));
                    }
                    ctor_names.push((*ctor.name, type_id));
                    ids.push(ctor_id);
                }
                TypeKind::Sum { ctors: ids }
            }
            TypeDef::Product { .. } => {
                let ctor_id = CtorId(ctor_names.len() as u32);
                ctor_by_name.insert(*decl.name, ctor_id);
                ctor_names.push((*decl.name, type_id));
                TypeKind::Product { ctor: ctor_id }
            }
        };

        types.push(Type {
            name: *decl.name,
            span: decl.name.span,
            kind,
        });
    }

    // Pass 2: resolve every field's type reference.
    let resolve_field = |field: &crate::schema::Field, errors: &mut Vec<Error>| -> FieldSpec {
        let ty = match field.ty.inner {
            TypeRef::Identifier => ResolvedTy::Identifier,
            TypeRef::Int => ResolvedTy::Int,
            TypeRef::String => ResolvedTy::String,
            TypeRef::Bool => ResolvedTy::Bool,
            TypeRef::Named(sym) => match type_by_name.get(&sym) {
                Some(&id) => ResolvedTy::Node(id),
                None => {
                    errors.push(Error::new(
                        ErrorKind::UnresolvedType,
                        format!("reference to undefined type '{}'", interner.resolve(sym)),
                        field.ty.span,
                    ));
                    ResolvedTy::Bool
                }
            },
        };
        FieldSpec {
            name: field.name.map(|n| n.inner),
            ty,
            mult: field.mult,
        }
    };

    let mut ctors = Vec::with_capacity(ctor_names.len());
    for decl in &decls {
        match &decl.def {
            TypeDef::Sum { ctors: cs, attributes } => {
                let attrs: Vec<FieldSpec> = attributes
                    .iter()
                    .map(|f| resolve_field(f, &mut errors))
                    .collect();
                for ctor in cs {
                    let mut fields: Vec<FieldSpec> = ctor
                        .fields
                        .iter()
                        .map(|f| resolve_field(f, &mut errors))
                        .collect();
                    // shared attribute fields are inherited by every
                    // constructor, after its own fields
                    fields.extend_from_slice(&attrs);
                    let (name, owner) = ctor_names[ctors.len()];
                    ctors.push(Ctor { name, owner, fields });
                }
            }
            TypeDef::Product { fields } => {
                let fields: Vec<FieldSpec> = fields
                    .iter()
                    .map(|f| resolve_field(f, &mut errors))
                    .collect();
                let (name, owner) = ctor_names[ctors.len()];
                ctors.push(Ctor { name, owner, fields });
            }
        }
    }

    // Pass 3: termination. A type terminates if a finite value of it can
    // be built: optional/sequence/builtin fields always terminate, a
    // required node field terminates iff its target does; a sum needs one
    // terminating constructor, a product needs all fields terminating.
    // Types left unmarked by the fixpoint sit on a required-edge cycle.
    if errors.is_empty() {
        check_termination(&types, &ctors, &interner, &mut errors);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let trivia_ok = vec![false; ctors.len()];
    Ok(Grammar {
        name: *name,
        types,
        ctors,
        ctor_by_name,
        type_by_name,
        trivia_ok,
        interner,
    })
}

fn field_terminates(field: &FieldSpec, terminating: &[bool]) -> bool {
    match (field.mult, field.ty) {
        (Multiplicity::Optional | Multiplicity::Sequence, _) => true,
        (Multiplicity::Required, ResolvedTy::Node(target)) => terminating[target.index()],
        (Multiplicity::Required, _) => true,
    }
}

fn check_termination(
    types: &[Type],
    ctors: &[Ctor],
    interner: &Interner,
    errors: &mut Vec<Error>,
) {
    let mut terminating = vec![false; types.len()];

    loop {
        let mut changed = false;
        for (index, ty) in types.iter().enumerate() {
            if terminating[index] {
                continue;
            }
            let ok = match &ty.kind {
                TypeKind::Sum { ctors: ids } => ids.iter().any(|&id| {
                    ctors[id.index()]
                        .fields
                        .iter()
                        .all(|f| field_terminates(f, &terminating))
                }),
                TypeKind::Product { ctor } => ctors[ctor.index()]
                    .fields
                    .iter()
                    .all(|f| field_terminates(f, &terminating)),
            };
            if ok {
                terminating[index] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Extract a representative cycle per group of unterminating types so
    // the report names the actual loop, not just its members.
    let mut reported = vec![false; types.len()];
    for start in 0..types.len() {
        if terminating[start] || reported[start] {
            continue;
        }

        let cycle = find_required_cycle(start, types, ctors, &terminating);
        for &member in &cycle {
            reported[member] = true;
        }

        let names: Vec<&str> = cycle
            .iter()
            .map(|&i| interner.resolve(types[i].name))
            .collect();
        let first = cycle.first().copied().unwrap_or(start);
        errors.push(Error::new(
            ErrorKind::InvalidRecursion,
            format!(
                "recursive cycle never passes through an optional or sequence field: {}",
                names.join(" -> ")
            ),
            types[first].span,
        ));
    }
}

/// Follows required node edges between unterminating types until a type
/// repeats, returning the loop portion of the walk.
fn find_required_cycle(
    start: usize,
    types: &[Type],
    ctors: &[Ctor],
    terminating: &[bool],
) -> Vec<usize> {
    let next = |index: usize| -> Option<usize> {
        let ctor_ids: Vec<CtorId> = match &types[index].kind {
            TypeKind::Sum { ctors } => ctors.clone(),
            TypeKind::Product { ctor } => vec![*ctor],
        };
        for id in ctor_ids {
            for field in &ctors[id.index()].fields {
                if field.mult != Multiplicity::Required {
                    continue;
                }
                if let ResolvedTy::Node(target) = field.ty {
                    if !terminating[target.index()] {
                        return Some(target.index());
                    }
                }
            }
        }
        None
    };

    let mut path = vec![start];
    let mut current = start;
    while let Some(target) = next(current) {
        if let Some(pos) = path.iter().position(|&i| i == target) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(target);
            return cycle;
        }
        path.push(target);
        current = target;
    }

    vec![start]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema, token::tokenize};

    fn grammar(src: &str) -> Grammar {
        validate(schema::parse(&tokenize(src)).unwrap()).expect("schema should validate")
    }

    fn errors(src: &str) -> Vec<Error> {
        validate(schema::parse(&tokenize(src)).unwrap()).expect_err("schema should be rejected")
    }

    const TOY: &str = "module Toy {\n\
        stmt = Assign(identifier target, expr value) | If(expr test, stmt* body)\n\
        expr = Name(identifier id) | Num(int n)\n\
        }";

    #[test]
    fn resolves_and_numbers_constructors_in_declaration_order() {
        let g = grammar(TOY);
        assert_eq!(g.name(), "Toy");
        assert_eq!(g.num_ctors(), 4);

        let assign = g.lookup_ctor("Assign").unwrap();
        let num = g.lookup_ctor("Num").unwrap();
        assert_eq!(assign.discriminant(), 0);
        assert_eq!(g.lookup_ctor("If").unwrap().discriminant(), 1);
        assert_eq!(g.lookup_ctor("Name").unwrap().discriminant(), 2);
        assert_eq!(num.discriminant(), 3);

        let expr = g.lookup_type("expr").unwrap();
        assert_eq!(g.ctor(assign).fields[1].ty, ResolvedTy::Node(expr));
        assert_eq!(g.ctor(assign).fields[1].mult, Multiplicity::Required);
        assert_eq!(g.field_index(assign, "target"), Some(0));
    }

    #[test]
    fn discriminants_are_deterministic_across_runs() {
        let a = grammar(TOY);
        let b = grammar(TOY);
        let a_discs: Vec<(String, u16)> = a
            .ctor_ids()
            .map(|id| (a.resolve(a.ctor(id).name).to_owned(), id.discriminant()))
            .collect();
        let b_discs: Vec<(String, u16)> = b
            .ctor_ids()
            .map(|id| (b.resolve(b.ctor(id).name).to_owned(), id.discriminant()))
            .collect();
        assert_eq!(a_discs, b_discs);
    }

    #[test]
    fn attributes_are_appended_to_every_constructor() {
        let g = grammar(
            "module M {\n\
             stmt = Exit | Stop(int code) attributes (int label)\n\
             }",
        );
        let exit = g.lookup_ctor("Exit").unwrap();
        let stop = g.lookup_ctor("Stop").unwrap();
        assert_eq!(g.ctor(exit).fields.len(), 1);
        assert_eq!(g.ctor(stop).fields.len(), 2);
        assert_eq!(g.field_index(stop, "label"), Some(1));
    }

    #[test]
    fn batches_all_semantic_errors() {
        let errs = errors(
            "module M {\n\
             stmt = Print(expr value) | Print(expr value)\n\
             stmt = Exit\n\
             }",
        );
        let kinds: Vec<ErrorKind> = errs.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&ErrorKind::DuplicateDeclaration));
        assert!(kinds.contains(&ErrorKind::UnresolvedType));
        assert_eq!(
            kinds
                .iter()
                .filter(|&&k| k == ErrorKind::DuplicateDeclaration)
                .count(),
            2
        );
    }

    #[test]
    fn required_self_recursion_through_a_sum_with_leaves_is_fine() {
        // BinOp requires two exprs, but Num terminates the recursion.
        grammar(
            "module M {\n\
             expr = BinOp(expr left, expr right) | Num(int n)\n\
             }",
        );
    }

    #[test]
    fn rejects_product_that_requires_itself() {
        let errs = errors("module M { t = (t inner, int tag) }");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::InvalidRecursion);
        assert!(errs[0].message.contains("t -> t"));
    }

    #[test]
    fn rejects_mutual_required_recursion_with_no_escape() {
        let errs = errors(
            "module M {\n\
             a = MkA(b inner)\n\
             b = MkB(a inner)\n\
             }",
        );
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::InvalidRecursion);
        assert!(errs[0].message.contains("->"));
    }

    #[test]
    fn optional_edge_breaks_a_cycle() {
        grammar(
            "module M {\n\
             a = MkA(b? inner)\n\
             b = MkB(a inner)\n\
             }",
        );
    }

    #[test]
    fn trivia_capability_is_per_sum_type() {
        let mut g = grammar(TOY);
        g.enable_trivia("stmt").unwrap();
        assert!(g.carries_trivia(g.lookup_ctor("Assign").unwrap()));
        assert!(g.carries_trivia(g.lookup_ctor("If").unwrap()));
        assert!(!g.carries_trivia(g.lookup_ctor("Name").unwrap()));
        assert!(g.enable_trivia("nope").is_err());
    }
}
