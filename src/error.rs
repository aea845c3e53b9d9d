use crate::span::Span;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error produced while loading a schema or sealing a visitor set.
///
/// Schema-stage errors are reported to whoever compiles the schema; they
/// are never printed from inside the library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed ASDL text. The parser fails fast on the first one.
    Syntax,
    /// A field references a type the module never declares.
    UnresolvedType,
    /// Two declarations (types or constructors) share a name.
    DuplicateDeclaration,
    /// A recursive type cycle with no optional/sequence escape, so no
    /// finite value of the type could ever be constructed.
    InvalidRecursion,
    /// A sealed visitor set is missing an operation for a constructor.
    IncompleteVisitor,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: impl Into<Span>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: span.into(),
        }
    }

    pub fn syntax(message: impl Into<String>, span: impl Into<Span>) -> Self {
        Self::new(ErrorKind::Syntax, message, span)
    }

    /// Renders the error against the source it was produced from, with a
    /// caret line under the offending region.
    pub fn render(&self, src: &str) -> String {
        let (line_no, col, line) = locate(src, self.span.start());
        let width = (self.span.end() - self.span.start()).max(1);
        let width = width.min(line.len().saturating_sub(col) + 1);

        let mut out = String::new();
        out.push_str(&format!("error: {}\n", self.message));
        out.push_str(&format!(" --> {line_no}:{}\n", col + 1));
        out.push_str(&format!("  | {line}\n"));
        out.push_str(&format!("  | {}{}\n", " ".repeat(col), "^".repeat(width)));
        out
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}: {}", self.kind, self.span, self.message)
    }
}

impl std::error::Error for Error {}

/// Renders a batch of validator errors, one block per error.
pub fn render_all(errors: &[Error], src: &str) -> String {
    let mut out = String::new();
    for error in errors {
        out.push_str(&error.render(src));
    }
    out
}

/// 1-based line number, 0-based column, and the text of the line
/// containing byte `offset`.
fn locate(src: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(src.len());
    let before = &src[..offset];
    let line_no = before.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = src[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(src.len());
    (line_no, offset - line_start, &src[line_start..line_end])
}
