//! ASDL surface grammar:
//!
//! ```text
//! module   := "module" NAME "{" decl* "}"
//! decl     := lname "=" product | sum
//! product  := "(" field,* ")"
//! sum      := ctor ("|" ctor)* ("attributes" "(" field,* ")")?
//! ctor     := UNAME ("(" field,* ")")?
//! field    := lname ("?" | "*")? lname?
//! ```
//!
//! `--` comments run to end of line. The grammar is LL(1) after
//! tokenization, so parsing is single-pass recursive descent with no
//! backtracking. The parser is pure: its only output is the returned
//! [`Module`] or the first syntax error.

use bumpalo::{Bump, collections::Vec as BumpVec};

use crate::{
    error::{Error, Result},
    intern::{Interner, Symbol},
    span::{Span, Spanned},
    token::{Token, TokenCursor, TokenKind, Tokens},
};

/// An unvalidated ASDL module: declarations in source order, names
/// interned but unresolved.
#[derive(Debug)]
pub struct Module {
    pub name: Spanned<Symbol>,
    pub decls: Vec<TypeDecl>,
    interner: Interner,
}

impl Module {
    #[inline]
    pub fn name_of(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    #[inline]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub(crate) fn into_parts(self) -> (Spanned<Symbol>, Vec<TypeDecl>, Interner) {
        (self.name, self.decls, self.interner)
    }
}

#[derive(Debug)]
pub struct TypeDecl {
    pub name: Spanned<Symbol>,
    pub def: TypeDef,
}

#[derive(Debug)]
pub enum TypeDef {
    /// A closed set of named constructors, optionally with shared
    /// attribute fields appended to every constructor.
    Sum {
        ctors: Vec<Constructor>,
        attributes: Vec<Field>,
    },
    /// A plain tuple.
    Product { fields: Vec<Field> },
}

#[derive(Debug)]
pub struct Constructor {
    pub name: Spanned<Symbol>,
    pub fields: Vec<Field>,
}

#[derive(Debug)]
pub struct Field {
    pub ty: Spanned<TypeRef>,
    pub mult: Multiplicity,
    pub name: Option<Spanned<Symbol>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Identifier,
    Int,
    String,
    Bool,
    /// Reference to another declared type, resolved by the validator.
    Named(Symbol),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    Required,
    Optional,
    Sequence,
}

pub fn parse(tokens: &Tokens<'_>) -> Result<Module> {
    let parser = State::new(tokens);
    parse_module(parser)
}

struct State<'t, 'src> {
    cursor: TokenCursor<'src, 't>,
    interner: Interner,
}

impl<'t, 'src> State<'t, 'src> {
    fn new(tokens: &'t Tokens<'src>) -> Self {
        Self {
            cursor: tokens.cursor(),
            interner: Interner::with_capacity(tokens.len() / 4),
        }
    }

    #[inline]
    fn kind(&self) -> TokenKind {
        let token = self.cursor.current();
        self.cursor.kind(token)
    }

    #[inline]
    fn lexeme(&self) -> &'src str {
        self.cursor.lexeme(self.cursor.current())
    }

    #[inline]
    fn span(&self) -> Span {
        self.cursor.span(self.cursor.current())
    }

    #[inline]
    fn advance(&mut self) {
        self.cursor.advance();
    }

    /// Iff current token is `kind`, returns `true`.
    ///
    /// Does not advance.
    #[inline]
    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    /// Iff current token is `kind` advances and returns `true`,
    /// otherwise returns `false` without advancing.
    #[inline]
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Iff current token is `kind`, returns `Ok(token)` and advances,
    /// otherwise returns `Err` without advancing.
    fn must(&mut self, kind: TokenKind) -> Result<Token> {
        let tok = self.cursor.current();
        if self.eat(kind) {
            Ok(tok)
        } else {
            Err(Error::syntax(
                format!(
                    "expected '{}', found '{}'",
                    kind.bare_lexeme(),
                    self.cursor.lexeme(tok)
                ),
                self.cursor.span(tok),
            ))
        }
    }

    /// Interns the lexeme of `token`, pairing it with the token's span.
    fn name(&mut self, token: Token) -> Spanned<Symbol> {
        let sym = self.interner.intern(self.cursor.lexeme(token));
        Spanned::new(sym, self.cursor.span(token))
    }
}

/// Allocate a vec with some small initial capacity in `buf`
fn temp<T>(buf: &Bump) -> BumpVec<'_, T> {
    BumpVec::with_capacity_in(8, buf)
}

fn parse_module(mut p: State) -> Result<Module> {
    let buf = Bump::new();

    p.must(t![module])?;

    // module names are conventionally capitalized, but ASDL does not
    // require it
    let name = match p.kind() {
        t![uname] | t![lname] => {
            let tok = p.cursor.current();
            p.advance();
            p.name(tok)
        }
        _ => {
            return Err(Error::syntax(
                format!("expected module name, found '{}'", p.lexeme()),
                p.span(),
            ));
        }
    };

    p.must(t!["{"])?;

    let mut decls = Vec::new();
    while !p.at(t!["}"]) {
        if p.at(t![EOF]) {
            return Err(Error::syntax("expected '}' before end of input", p.span()));
        }
        decls.push(parse_decl(&mut p, &buf)?);
    }
    p.must(t!["}"])?;
    p.must(t![EOF])?;

    Ok(Module {
        name,
        decls,
        interner: p.interner,
    })
}

fn parse_decl(p: &mut State, buf: &Bump) -> Result<TypeDecl> {
    let tok = p.must(t![lname])?;
    let name = p.name(tok);
    p.must(t![=])?;

    let def = if p.at(t!["("]) {
        TypeDef::Product {
            fields: parse_field_list(p, buf)?,
        }
    } else {
        let mut ctors = vec![parse_ctor(p, buf)?];
        while p.eat(t![|]) {
            ctors.push(parse_ctor(p, buf)?);
        }

        let attributes = if p.eat(t![attributes]) {
            parse_field_list(p, buf)?
        } else {
            Vec::new()
        };

        TypeDef::Sum { ctors, attributes }
    };

    Ok(TypeDecl { name, def })
}

fn parse_ctor(p: &mut State, buf: &Bump) -> Result<Constructor> {
    let tok = p.must(t![uname])?;
    let name = p.name(tok);

    let fields = if p.at(t!["("]) {
        parse_field_list(p, buf)?
    } else {
        Vec::new()
    };

    Ok(Constructor { name, fields })
}

fn parse_field_list(p: &mut State, buf: &Bump) -> Result<Vec<Field>> {
    p.must(t!["("])?;

    let mut fields = temp(buf);
    if !p.at(t![")"]) {
        fields.push(parse_field(p)?);
        while p.eat(t![,]) {
            fields.push(parse_field(p)?);
        }
    }
    p.must(t![")"])?;

    Ok(Vec::from_iter(fields))
}

fn parse_field(p: &mut State) -> Result<Field> {
    let tok = p.must(t![lname])?;
    let ty = match p.cursor.lexeme(tok) {
        "identifier" => TypeRef::Identifier,
        "int" => TypeRef::Int,
        "string" => TypeRef::String,
        "bool" => TypeRef::Bool,
        _ => TypeRef::Named(p.name(tok).into_inner()),
    };
    let ty = Spanned::new(ty, p.cursor.span(tok));

    let mult = if p.eat(t![?]) {
        Multiplicity::Optional
    } else if p.eat(t![*]) {
        Multiplicity::Sequence
    } else {
        Multiplicity::Required
    };

    let name = if p.at(t![lname]) {
        let tok = p.cursor.current();
        p.advance();
        Some(p.name(tok))
    } else {
        None
    };

    Ok(Field { ty, mult, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn parse_ok(src: &str) -> Module {
        parse(&tokenize(src)).expect("schema should parse")
    }

    #[test]
    fn parses_sums_products_and_attributes() {
        let module = parse_ok(
            "-- a toy statement grammar\n\
             module Toy {\n\
               stmt = Assign(identifier target, expr value)\n\
                    | If(expr test, stmt* body)\n\
                    | Exit\n\
                    attributes (int label)\n\
               expr = Name(identifier id) | Num(int n)\n\
               dim = (expr? start, expr? end)\n\
             }",
        );

        assert_eq!(module.name_of(*module.name), "Toy");
        assert_eq!(module.decls.len(), 3);

        let TypeDef::Sum { ctors, attributes } = &module.decls[0].def else {
            panic!("stmt should be a sum");
        };
        assert_eq!(ctors.len(), 3);
        assert_eq!(module.name_of(*ctors[1].name), "If");
        assert_eq!(ctors[1].fields.len(), 2);
        assert_eq!(ctors[1].fields[1].mult, Multiplicity::Sequence);
        assert!(ctors[2].fields.is_empty());
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].ty.inner, TypeRef::Int);

        let TypeDef::Product { fields } = &module.decls[2].def else {
            panic!("dim should be a product");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].mult, Multiplicity::Optional);
        let TypeRef::Named(expr) = fields[0].ty.inner else {
            panic!("dim fields should reference expr");
        };
        assert_eq!(module.name_of(expr), "expr");
    }

    #[test]
    fn field_names_are_optional() {
        let module = parse_ok("module M { pair = (int, int second) }");
        let TypeDef::Product { fields } = &module.decls[0].def else {
            panic!();
        };
        assert!(fields[0].name.is_none());
        assert_eq!(module.name_of(fields[1].name.unwrap().inner), "second");
    }

    #[test]
    fn reports_missing_paren_with_span() {
        let err = parse(&tokenize("module M { stmt = If(expr test }")).unwrap_err();
        assert_eq!(err.message, "expected ')', found '}'");
        assert_eq!(err.span, Span::from(31usize..32));
    }

    #[test]
    fn reports_unterminated_module() {
        let err = parse(&tokenize("module M { stmt = Exit")).unwrap_err();
        assert_eq!(err.message, "expected '}' before end of input");
    }

    #[test]
    fn rejects_lowercase_constructor() {
        let err = parse(&tokenize("module M { stmt = exit }")).unwrap_err();
        assert_eq!(err.message, "expected 'Constructor', found 'exit'");
    }
}
