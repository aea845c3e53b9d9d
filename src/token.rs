use logos::Logos as _;

use crate::span::Span;

pub fn tokenize(src: &str) -> Tokens<'_> {
    let mut tokens = Tokens::new(src);

    for (kind, span) in TokenKind::lexer(src).spanned() {
        let kind = kind.unwrap_or(TokenKind::Error);
        tokens.append(kind, span.into());
    }

    tokens
}

pub struct Tokens<'src> {
    src: &'src str,
    kind: Vec<TokenKind>,
    span: Vec<Span>,
}

impl<'src> Tokens<'src> {
    fn new(src: &'src str) -> Self {
        // shrug
        let capacity = src.len() / 6;
        Self {
            src,
            kind: Vec::with_capacity(capacity),
            span: Vec::with_capacity(capacity),
        }
    }

    fn append(&mut self, kind: TokenKind, span: Span) {
        self.kind.push(kind);
        self.span.push(span);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.kind.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
    }

    #[inline]
    pub fn cursor<'tokens>(&'tokens self) -> TokenCursor<'src, 'tokens> {
        TokenCursor {
            tokens: self,
            index: 0,
        }
    }

    #[inline]
    pub fn kind(&self, token: Token) -> TokenKind {
        if token.index() >= self.kind.len() {
            return TokenKind::Eof;
        }

        self.kind[token.index()]
    }

    #[inline]
    pub fn span(&self, token: Token) -> Span {
        if token.index() >= self.span.len() {
            let end = self.src.len();
            return Span::from(end..end);
        }

        self.span[token.index()]
    }

    #[inline]
    pub fn lexeme(&self, token: Token) -> &'src str {
        &self.src[self.span(token)]
    }
}

impl std::fmt::Debug for Tokens<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (index, kind) in self.kind.iter().enumerate() {
            let token = Token(index as u32);
            list.entry(&format_args!(
                "{kind:?}({:?}, {})",
                self.lexeme(token),
                self.span(token)
            ));
        }
        list.finish()
    }
}

pub struct TokenCursor<'src, 'tokens> {
    tokens: &'tokens Tokens<'src>,
    index: usize,
}

impl<'src> TokenCursor<'src, '_> {
    #[inline]
    pub fn kind(&self, token: Token) -> TokenKind {
        self.tokens.kind(token)
    }

    #[inline]
    pub fn lexeme(&self, token: Token) -> &'src str {
        self.tokens.lexeme(token)
    }

    #[inline]
    pub fn span(&self, token: Token) -> Span {
        self.tokens.span(token)
    }

    #[inline]
    pub fn advance(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }

    #[inline]
    pub fn current(&self) -> Token {
        Token(self.index as u32)
    }

    #[inline]
    pub fn peek(&self) -> Token {
        Token((self.index + 1) as u32)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Token(u32);

impl Token {
    #[inline]
    fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, logos::Logos)]
pub enum TokenKind {
    #[token("module")]
    Module,
    #[token("attributes")]
    Attributes,

    /// Type and field names.
    #[regex(r"[a-z_][a-zA-Z_0-9]*")]
    LowerIdent,
    /// Constructor names.
    #[regex(r"[A-Z][a-zA-Z_0-9]*")]
    UpperIdent,

    #[token("=")]
    Eq,
    #[token("|")]
    Pipe,
    #[token("(")]
    ParenL,
    #[token(")")]
    ParenR,
    #[token("{")]
    BraceL,
    #[token("}")]
    BraceR,
    #[token(",")]
    Comma,
    #[token("?")]
    Question,
    #[token("*")]
    Star,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
    #[regex(r"--[^\n]*", logos::skip)]
    Comment,

    Error,
    Eof,
}

impl TokenKind {
    /// The token's surface form, used in "expected" error messages.
    pub fn bare_lexeme(&self) -> &'static str {
        match self {
            TokenKind::Module => "module",
            TokenKind::Attributes => "attributes",
            TokenKind::LowerIdent => "name",
            TokenKind::UpperIdent => "Constructor",
            TokenKind::Eq => "=",
            TokenKind::Pipe => "|",
            TokenKind::ParenL => "(",
            TokenKind::ParenR => ")",
            TokenKind::BraceL => "{",
            TokenKind::BraceR => "}",
            TokenKind::Comma => ",",
            TokenKind::Question => "?",
            TokenKind::Star => "*",
            TokenKind::Whitespace | TokenKind::Comment => " ",
            TokenKind::Error => "<invalid>",
            TokenKind::Eof => "<eof>",
        }
    }
}

#[rustfmt::skip]
macro_rules! t {
    (module) => ($crate::token::TokenKind::Module);
    (attributes) => ($crate::token::TokenKind::Attributes);
    (lname) => ($crate::token::TokenKind::LowerIdent);
    (uname) => ($crate::token::TokenKind::UpperIdent);
    (=) => ($crate::token::TokenKind::Eq);
    (|) => ($crate::token::TokenKind::Pipe);
    ("(") => ($crate::token::TokenKind::ParenL);
    (")") => ($crate::token::TokenKind::ParenR);
    ("{") => ($crate::token::TokenKind::BraceL);
    ("}") => ($crate::token::TokenKind::BraceR);
    (,) => ($crate::token::TokenKind::Comma);
    (?) => ($crate::token::TokenKind::Question);
    (*) => ($crate::token::TokenKind::Star);
    (EOF) => ($crate::token::TokenKind::Eof);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_a_sum_declaration() {
        let tokens = tokenize("stmt = If(expr test, stmt* body) | Exit -- trailing\n");
        let kinds: Vec<_> = (0..tokens.len())
            .map(|i| tokens.kind(Token(i as u32)))
            .collect();
        assert_eq!(
            kinds,
            vec![
                t![lname],
                t![=],
                t![uname],
                t!["("],
                t![lname],
                t![lname],
                t![,],
                t![lname],
                t![*],
                t![lname],
                t![")"],
                t![|],
                t![uname],
            ]
        );
    }

    #[test]
    fn keywords_do_not_swallow_longer_identifiers() {
        let tokens = tokenize("module modules attributes");
        assert_eq!(tokens.kind(Token(0)), TokenKind::Module);
        assert_eq!(tokens.kind(Token(1)), TokenKind::LowerIdent);
        assert_eq!(tokens.lexeme(Token(1)), "modules");
        assert_eq!(tokens.kind(Token(2)), TokenKind::Attributes);
    }

    #[test]
    fn cursor_yields_eof_past_the_end() {
        let tokens = tokenize("x");
        let mut cursor = tokens.cursor();
        assert_eq!(cursor.kind(cursor.current()), TokenKind::LowerIdent);
        cursor.advance();
        assert_eq!(cursor.kind(cursor.current()), TokenKind::Eof);
        assert_eq!(cursor.span(cursor.current()), Span::from(1usize..1));
    }
}
