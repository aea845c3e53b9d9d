//! Formatting trivia: the non-semantic source data (comments, line
//! endings, statement separators) a statement-bearing node carries so
//! the tree can regenerate the exact source text.
//!
//! A [`TriviaNode`] has two ordered item lists: `inside` holds trivia
//! encountered before the statement's own terminator, `after` holds
//! trivia following it. Within each list, a full-line comment opens a
//! line that must be closed by a terminating item (end-of-line,
//! semicolon, or end-of-line comment) before anything else may follow;
//! a list never ends on an open line. [`TriviaNode`] can only be built
//! through [`TriviaBuilder`] or [`TriviaNode::new`], both of which
//! enforce that invariant, so an unterminated trivia sequence is not
//! producible through the public API.

/// One piece of trivia, in source order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriviaItem {
    /// A comment occupying (the rest of) its own line. Opens a line.
    Comment(Box<str>),
    /// A trailing comment that also ends the line. Terminates.
    EolComment(Box<str>),
    /// A plain line ending. Terminates.
    EndOfLine,
    /// A statement separator. Terminates.
    Semicolon,
}

impl TriviaItem {
    pub fn comment(text: impl Into<Box<str>>) -> TriviaItem {
        TriviaItem::Comment(text.into())
    }

    pub fn eol_comment(text: impl Into<Box<str>>) -> TriviaItem {
        TriviaItem::EolComment(text.into())
    }

}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriviaNode {
    inside: Box<[TriviaItem]>,
    after: Box<[TriviaItem]>,
}

impl TriviaNode {
    /// Builds a trivia node, rejecting any list that leaves a line open.
    pub fn new(
        inside: Vec<TriviaItem>,
        after: Vec<TriviaItem>,
    ) -> Result<TriviaNode, UnterminatedLine> {
        check_terminated(&inside)?;
        check_terminated(&after)?;
        Ok(TriviaNode {
            inside: inside.into_boxed_slice(),
            after: after.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn inside(&self) -> &[TriviaItem] {
        &self.inside
    }

    #[inline]
    pub fn after(&self) -> &[TriviaItem] {
        &self.after
    }
}

/// A trivia item list left a comment's line without a terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnterminatedLine;

impl std::fmt::Display for UnterminatedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("trivia sequence leaves a line unterminated")
    }
}

impl std::error::Error for UnterminatedLine {}

fn check_terminated(items: &[TriviaItem]) -> Result<(), UnterminatedLine> {
    let mut open = false;
    for item in items {
        match item {
            TriviaItem::Comment(_) => {
                if open {
                    return Err(UnterminatedLine);
                }
                open = true;
            }
            TriviaItem::EolComment(_) | TriviaItem::EndOfLine | TriviaItem::Semicolon => {
                open = false;
            }
        }
    }
    if open { Err(UnterminatedLine) } else { Ok(()) }
}

/// Incremental construction in source order; `finish` refuses to produce
/// a node with an open line.
#[derive(Default)]
pub struct TriviaBuilder {
    inside: Vec<TriviaItem>,
    after: Vec<TriviaItem>,
    in_after: bool,
}

impl TriviaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, item: TriviaItem) -> &mut Self {
        if self.in_after {
            self.after.push(item);
        } else {
            self.inside.push(item);
        }
        self
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.push(TriviaItem::comment(text))
    }

    pub fn eol_comment(&mut self, text: &str) -> &mut Self {
        self.push(TriviaItem::eol_comment(text))
    }

    pub fn end_of_line(&mut self) -> &mut Self {
        self.push(TriviaItem::EndOfLine)
    }

    pub fn semicolon(&mut self) -> &mut Self {
        self.push(TriviaItem::Semicolon)
    }

    /// Everything pushed from here on lands in the `after` list.
    pub fn after_terminator(&mut self) -> &mut Self {
        self.in_after = true;
        self
    }

    pub fn finish(self) -> Result<TriviaNode, UnterminatedLine> {
        TriviaNode::new(self.inside, self.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_followed_by_eol_is_terminated() {
        let mut b = TriviaBuilder::new();
        b.comment("setup").end_of_line();
        b.after_terminator().semicolon().eol_comment("done");
        let node = b.finish().unwrap();
        assert_eq!(node.inside().len(), 2);
        assert_eq!(node.after().len(), 2);
    }

    #[test]
    fn trailing_open_comment_is_rejected() {
        let mut b = TriviaBuilder::new();
        b.comment("dangling");
        assert_eq!(b.finish().unwrap_err(), UnterminatedLine);
    }

    #[test]
    fn adjacent_comments_without_terminator_are_rejected() {
        let err = TriviaNode::new(
            vec![TriviaItem::comment("a"), TriviaItem::comment("b")],
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, UnterminatedLine);
    }

    #[test]
    fn eol_comment_terminates_its_own_line() {
        let node = TriviaNode::new(vec![TriviaItem::eol_comment("trailing")], Vec::new()).unwrap();
        assert_eq!(node.inside().len(), 1);
    }
}
