//! Printing and the round-trip oracle.
//!
//! [`Printer`] is a sealed walker (shape 1): the operation registered
//! for a constructor emits its textual form interleaved with the node's
//! trivia. The default, grammar-generic canonical form is
//! `Ctor(field, ...)` with `()` for absent optionals, `[...]` for
//! sequences, and a ` @[inside][after]` suffix for trivia; [`read`]
//! parses that form back into a tree, which closes the loop for
//! [`check_round_trip`]. Callers wanting a language's concrete surface
//! syntax register their own operations instead (the walker machinery is
//! the same either way).

use logos::Logos as _;

use crate::{
    error::{Error, Result},
    schema::Multiplicity,
    span::Span,
    tree::{Item, NodeId, Tree, TreeBuilder, Value},
    trivia::{TriviaItem, TriviaNode},
    validate::{Grammar, ResolvedTy},
    visit::Walker,
};

pub struct Printer<'g> {
    walker: Walker<'g, String>,
}

impl<'g> Printer<'g> {
    pub fn new(grammar: &'g Grammar) -> Printer<'g> {
        let walker = Walker::builder(grammar)
            .fallback(print_node)
            .finish()
            .expect("fallback registers an operation for every constructor");
        Printer { walker }
    }

    pub fn print(&self, tree: &Tree<'g>) -> String {
        let mut out = String::new();
        self.walker.dispatch(tree, tree.root(), &mut out);
        out
    }
}

fn print_node<'g>(w: &Walker<'g, String>, tree: &Tree<'g>, node: NodeId, out: &mut String) {
    out.push_str(tree.ctor_name(node));
    out.push('(');
    for (index, value) in tree.fields(node).iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        match value {
            Value::One(item) | Value::Opt(Some(item)) => print_item(w, tree, item, out),
            Value::Opt(None) => out.push_str("()"),
            Value::Seq(items) => {
                out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    print_item(w, tree, item, out);
                }
                out.push(']');
            }
        }
    }
    out.push(')');

    if let Some(trivia) = tree.trivia(node) {
        print_trivia(trivia, out);
    }
}

fn print_item<'g>(w: &Walker<'g, String>, tree: &Tree<'g>, item: &Item, out: &mut String) {
    match item {
        Item::Node(child) => w.dispatch(tree, *child, out),
        Item::Identifier(sym) => out.push_str(tree.ident(*sym)),
        Item::Str(sym) => quote(tree.ident(*sym), out),
        Item::Int(v) => out.push_str(&v.to_string()),
        Item::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
    }
}

fn print_trivia(trivia: &TriviaNode, out: &mut String) {
    out.push_str(" @");
    for list in [trivia.inside(), trivia.after()] {
        out.push('[');
        for (index, item) in list.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            match item {
                TriviaItem::Comment(text) => {
                    out.push_str("c ");
                    quote(text, out);
                }
                TriviaItem::EolComment(text) => {
                    out.push_str("ec ");
                    quote(text, out);
                }
                TriviaItem::EndOfLine => out.push_str("nl"),
                TriviaItem::Semicolon => out.push_str("sc"),
            }
        }
        out.push(']');
    }
}

fn quote(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn unquote(lexeme: &str) -> String {
    let inner = &lexeme[1..lexeme.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(c) => out.push(c),
            None => {}
        }
    }
    out
}

/// Reads the canonical form back into a tree over `grammar`.
pub fn read<'g>(grammar: &'g Grammar, src: &str) -> Result<Tree<'g>> {
    let mut reader = Reader::new(grammar, src);
    let mut builder = TreeBuilder::new(grammar);
    let root = reader.node(&mut builder)?;
    reader.must(ReadToken::Eof)?;
    Ok(builder.freeze(root))
}

/// The testing oracle: printing, re-reading and re-printing a tree must
/// reach a fixpoint after one cycle, and the re-read tree must be
/// structurally identical (spans aside).
pub fn check_round_trip(tree: &Tree<'_>) -> Result<()> {
    let grammar = tree.grammar();
    let printer = Printer::new(grammar);

    let text = printer.print(tree);
    let reread = read(grammar, &text)?;
    if !tree.structurally_eq(&reread) {
        return Err(Error::syntax(
            "round-trip produced a structurally different tree",
            Span::empty(),
        ));
    }

    let again = printer.print(&reread);
    if again != text {
        return Err(Error::syntax("round-trip print is not a fixpoint", Span::empty()));
    }
    Ok(())
}

impl std::fmt::Debug for Tree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Printer::new(self.grammar()).print(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, logos::Logos)]
enum ReadToken {
    #[regex(r"[A-Za-z_][A-Za-z_0-9]*")]
    Ident,
    #[regex(r"-?[0-9]+")]
    Int,
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,
    #[token("(")]
    ParenL,
    #[token(")")]
    ParenR,
    #[token("[")]
    BracketL,
    #[token("]")]
    BracketR,
    #[token(",")]
    Comma,
    #[token("@")]
    At,
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
    Error,
    Eof,
}

impl ReadToken {
    fn describe(self) -> &'static str {
        match self {
            ReadToken::Ident => "a name",
            ReadToken::Int => "an integer",
            ReadToken::Str => "a string",
            ReadToken::ParenL => "'('",
            ReadToken::ParenR => "')'",
            ReadToken::BracketL => "'['",
            ReadToken::BracketR => "']'",
            ReadToken::Comma => "','",
            ReadToken::At => "'@'",
            ReadToken::Whitespace => "' '",
            ReadToken::Error => "<invalid>",
            ReadToken::Eof => "end of input",
        }
    }
}

struct Reader<'g, 'src> {
    grammar: &'g Grammar,
    src: &'src str,
    tokens: Vec<(ReadToken, Span)>,
    pos: usize,
}

impl<'g, 'src> Reader<'g, 'src> {
    fn new(grammar: &'g Grammar, src: &'src str) -> Self {
        let tokens = ReadToken::lexer(src)
            .spanned()
            .map(|(kind, span)| (kind.unwrap_or(ReadToken::Error), Span::from(span)))
            .collect();
        Self {
            grammar,
            src,
            tokens,
            pos: 0,
        }
    }

    fn kind(&self) -> ReadToken {
        self.tokens
            .get(self.pos)
            .map(|&(kind, _)| kind)
            .unwrap_or(ReadToken::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|&(_, span)| span)
            .unwrap_or_else(|| Span::from(self.src.len()..self.src.len()))
    }

    fn lexeme(&self) -> &'src str {
        &self.src[self.span()]
    }

    fn eat(&mut self, kind: ReadToken) -> bool {
        if self.kind() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn must(&mut self, kind: ReadToken) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(Error::syntax(
                format!("expected {}, found '{}'", kind.describe(), self.lexeme()),
                self.span(),
            ))
        }
    }

    fn node(&mut self, builder: &mut TreeBuilder<'g>) -> Result<NodeId> {
        let start = self.span();
        let name = self.lexeme();
        self.must(ReadToken::Ident)?;

        let Some(ctor) = self.grammar.lookup_ctor(name) else {
            return Err(Error::syntax(
                format!("unknown constructor '{name}'"),
                start,
            ));
        };

        self.must(ReadToken::ParenL)?;
        let num_fields = self.grammar.ctor(ctor).fields.len();
        let mut values = Vec::with_capacity(num_fields);
        for index in 0..num_fields {
            if index > 0 {
                self.must(ReadToken::Comma)?;
            }
            let spec = self.grammar.ctor(ctor).fields[index];
            values.push(self.value(builder, spec.mult, spec.ty)?);
        }
        let end = self.span();
        self.must(ReadToken::ParenR)?;

        let id = builder.alloc(ctor, values, start.to(end));

        if self.eat(ReadToken::At) {
            if !self.grammar.carries_trivia(ctor) {
                return Err(Error::syntax(
                    format!("constructor '{name}' does not carry trivia"),
                    start,
                ));
            }
            let inside = self.trivia_list()?;
            let after = self.trivia_list()?;
            let trivia = TriviaNode::new(inside, after)
                .map_err(|e| Error::syntax(e.to_string(), start))?;
            builder.attach_trivia(id, trivia);
        }

        Ok(id)
    }

    fn value(
        &mut self,
        builder: &mut TreeBuilder<'g>,
        mult: Multiplicity,
        ty: ResolvedTy,
    ) -> Result<Value> {
        match mult {
            Multiplicity::Required => Ok(Value::One(self.item(builder, ty)?)),
            Multiplicity::Optional => {
                if self.eat(ReadToken::ParenL) {
                    self.must(ReadToken::ParenR)?;
                    Ok(Value::Opt(None))
                } else {
                    Ok(Value::Opt(Some(self.item(builder, ty)?)))
                }
            }
            Multiplicity::Sequence => {
                self.must(ReadToken::BracketL)?;
                let mut items = Vec::new();
                if !self.eat(ReadToken::BracketR) {
                    items.push(self.item(builder, ty)?);
                    while self.eat(ReadToken::Comma) {
                        items.push(self.item(builder, ty)?);
                    }
                    self.must(ReadToken::BracketR)?;
                }
                Ok(Value::Seq(items.into_boxed_slice()))
            }
        }
    }

    fn item(&mut self, builder: &mut TreeBuilder<'g>, ty: ResolvedTy) -> Result<Item> {
        match ty {
            ResolvedTy::Node(expected) => {
                let span = self.span();
                let child = self.node(builder)?;
                let owner = self.grammar.ctor(builder.ctor(child)).owner;
                if owner != expected {
                    return Err(Error::syntax(
                        format!(
                            "expected a '{}' node",
                            self.grammar.resolve(self.grammar.ty(expected).name)
                        ),
                        span,
                    ));
                }
                Ok(Item::Node(child))
            }
            ResolvedTy::Identifier => {
                let text = self.lexeme();
                self.must(ReadToken::Ident)?;
                Ok(Item::Identifier(builder.intern(text)))
            }
            ResolvedTy::String => {
                let lexeme = self.lexeme();
                self.must(ReadToken::Str)?;
                Ok(Item::Str(builder.intern(&unquote(lexeme))))
            }
            ResolvedTy::Int => {
                let text = self.lexeme();
                let span = self.span();
                self.must(ReadToken::Int)?;
                text.parse::<i64>()
                    .map(Item::Int)
                    .map_err(|_| Error::syntax("integer out of range", span))
            }
            ResolvedTy::Bool => {
                let span = self.span();
                let text = self.lexeme();
                self.must(ReadToken::Ident)?;
                match text {
                    "true" => Ok(Item::Bool(true)),
                    "false" => Ok(Item::Bool(false)),
                    _ => Err(Error::syntax("expected 'true' or 'false'", span)),
                }
            }
        }
    }

    fn trivia_list(&mut self) -> Result<Vec<TriviaItem>> {
        self.must(ReadToken::BracketL)?;
        let mut items = Vec::new();
        if self.eat(ReadToken::BracketR) {
            return Ok(items);
        }
        loop {
            items.push(self.trivia_item()?);
            if !self.eat(ReadToken::Comma) {
                break;
            }
        }
        self.must(ReadToken::BracketR)?;
        Ok(items)
    }

    fn trivia_item(&mut self) -> Result<TriviaItem> {
        let span = self.span();
        let word = self.lexeme();
        self.must(ReadToken::Ident)?;
        match word {
            "nl" => Ok(TriviaItem::EndOfLine),
            "sc" => Ok(TriviaItem::Semicolon),
            "c" | "ec" => {
                let lexeme = self.lexeme();
                self.must(ReadToken::Str)?;
                let text = unquote(lexeme);
                if word == "c" {
                    Ok(TriviaItem::comment(text))
                } else {
                    Ok(TriviaItem::eol_comment(text))
                }
            }
            _ => Err(Error::syntax(
                format!("unknown trivia item '{word}'"),
                span,
            )),
        }
    }
}
