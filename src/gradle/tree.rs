use crate::gradle::errors::GradleError;
use crate::gradle::scanner::{scan, Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Block(Block),
    Statement(Statement),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Block(block) => &block.name,
            Node::Statement(statement) => &statement.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Node::Block(block) => block.span,
            Node::Statement(statement) => statement.span,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(block) => Some(block),
            Node::Statement(_) => None,
        }
    }
}

/// Offsets of a block's `{` and `}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Braces {
    pub open: usize,
    pub close: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block name; empty for the document root.
    pub name: String,
    /// Tokens between the name and `{`, e.g. `foo(type: Copy)` in
    /// `task foo(type: Copy) { ... }`.
    pub header: Vec<Token>,
    pub children: Vec<Node>,
    /// From the first byte of the name through the closing brace.
    pub span: Span,
    /// `None` only for the synthetic document root.
    pub braces: Option<Braces>,
    /// `name {}` with both braces on one line and nothing between them.
    pub is_empty_inline: bool,
}

impl Block {
    pub fn is_document(&self) -> bool {
        self.braces.is_none()
    }

    /// Child blocks, in source order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.children.iter().filter_map(Node::as_block)
    }

    /// Child blocks named `name`, in source order.
    pub fn blocks_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks().filter(move |block| block.name == name)
    }

    /// Pre-order walk over this block and every nested block.
    pub fn walk(&self) -> Vec<&Block> {
        let mut out = vec![self];
        for child in self.blocks() {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub name: String,
    /// Argument tokens verbatim, trivia and line breaks excluded.
    pub args: Vec<Token>,
    pub span: Span,
}

/// A parsed script: the source text plus its span tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source: String,
    root: Block,
}

impl Document {
    /// Scan and build in one step.
    pub fn parse(source: &str) -> Result<Self, GradleError> {
        let tokens = scan(source)?;
        build(source, tokens)
    }

    pub(crate) fn from_parts(source: String, root: Block) -> Self {
        Self { source, root }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Block {
        &self.root
    }

    /// Serialize the unmodified tree. Nodes carry no text of their own, so
    /// this is exactly the parsed source.
    pub fn to_source(&self) -> String {
        self.source.clone()
    }

    pub fn text(&self, span: Span) -> &str {
        &self.source[span.start..span.end]
    }
}

/// Build the span tree for `source` from its complete token stream.
pub fn build(source: &str, tokens: Vec<Token>) -> Result<Document, GradleError> {
    let mut builder = TreeBuilder {
        source,
        tokens: tokens.into_iter().filter(|t| !t.is_trivia()).collect(),
        pos: 0,
    };
    let children = builder.body(None)?;
    let root = Block {
        name: String::new(),
        header: Vec::new(),
        children,
        span: Span::new(0, source.len()),
        braces: None,
        is_empty_inline: false,
    };
    Ok(Document::from_parts(source.to_string(), root))
}

struct TreeBuilder<'a> {
    source: &'a str,
    /// Significant tokens only: everything but whitespace and comments.
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> TreeBuilder<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> GradleError {
        GradleError::parse(self.source, offset, message)
    }

    /// Parse items until EOF (top level) or the `}` closing `open`.
    /// Returns the children; for nested bodies the closing brace is left
    /// for the caller to consume.
    fn body(&mut self, open: Option<(usize, &str)>) -> Result<Vec<Node>, GradleError> {
        let mut children = Vec::new();
        loop {
            let Some(token) = self.peek() else {
                return match open {
                    Some((offset, name)) => {
                        Err(self.error(offset, format!("unclosed `{{` for block `{name}`")))
                    }
                    None => Ok(children),
                };
            };

            match token.kind {
                TokenKind::Newline => self.pos += 1,
                TokenKind::Symbol if token.is_symbol(';') => self.pos += 1,
                TokenKind::Symbol if token.is_symbol('}') => {
                    if open.is_some() {
                        return Ok(children);
                    }
                    return Err(self.error(token.span.start, "unmatched `}`"));
                }
                TokenKind::Identifier => children.push(self.item()?),
                _ => {
                    return Err(self.error(
                        token.span.start,
                        format!("expected a name, found `{}`", token.text),
                    ));
                }
            }
        }
    }

    /// Dotted identifier chain with no gaps: `android.defaultConfig`.
    fn name(&mut self) -> Option<(String, Span)> {
        let first = self.next()?;
        let mut name = first.text;
        let mut span = first.span;
        while let (Some(dot), Some(ident)) = (self.peek(), self.peek_at(1)) {
            let adjacent = dot.span.start == span.end && ident.span.start == dot.span.end;
            if !(adjacent && dot.is_symbol('.') && ident.kind == TokenKind::Identifier) {
                break;
            }
            name.push('.');
            name.push_str(&ident.text);
            span.end = ident.span.end;
            self.pos += 2;
        }
        Some((name, span))
    }

    fn item(&mut self) -> Result<Node, GradleError> {
        let Some((name, name_span)) = self.name() else {
            return Err(self.error(self.source.len(), "expected a name"));
        };

        let mut args: Vec<Token> = Vec::new();
        let mut stack: Vec<Token> = Vec::new();

        loop {
            let Some(token) = self.peek() else {
                if let Some(open) = stack.last() {
                    return Err(self.error(
                        open.span.start,
                        format!("unclosed `{}` in arguments of `{name}`", open.text),
                    ));
                }
                break;
            };

            if stack.is_empty() {
                if token.kind == TokenKind::Newline {
                    // `name` alone on a line with its `{` on the next one.
                    if args.is_empty() && self.brace_after_newlines() {
                        while self.peek().is_some_and(|t| t.kind == TokenKind::Newline) {
                            self.pos += 1;
                        }
                        return self.block(name, name_span, args);
                    }
                    break;
                }
                if token.is_symbol(';') || token.is_symbol('}') {
                    break;
                }
                if token.is_symbol('{') {
                    return self.block(name, name_span, args);
                }
            }

            let Some(token) = self.next() else { break };
            if token.kind == TokenKind::Newline {
                continue;
            }
            if token.is_symbol('(') || token.is_symbol('[') || token.is_symbol('{') {
                stack.push(token.clone());
            } else if let Some(expected) = closing_for(&token) {
                match stack.pop() {
                    Some(open) if open.is_symbol(expected) => {}
                    Some(open) => {
                        return Err(self.error(
                            token.span.start,
                            format!("`{}` does not close `{}`", token.text, open.text),
                        ));
                    }
                    None => {
                        return Err(self.error(
                            token.span.start,
                            format!("unmatched `{}`", token.text),
                        ));
                    }
                }
            }
            args.push(token);
        }

        let Some(last) = args.last() else {
            return Err(self.error(
                name_span.end,
                format!("expected `{{` or an argument after `{name}`"),
            ));
        };

        Ok(Node::Statement(Statement {
            span: Span::new(name_span.start, last.span.end),
            name,
            args,
        }))
    }

    fn brace_after_newlines(&self) -> bool {
        self.tokens[self.pos..]
            .iter()
            .find(|t| t.kind != TokenKind::Newline)
            .is_some_and(|t| t.is_symbol('{'))
    }

    /// Parse `{ body }`; the cursor is on the opening brace.
    fn block(
        &mut self,
        name: String,
        name_span: Span,
        header: Vec<Token>,
    ) -> Result<Node, GradleError> {
        let Some(open) = self.next() else {
            return Err(self.error(self.source.len(), "expected `{`"));
        };
        let open_offset = open.span.start;
        let children = self.body(Some((open_offset, name.as_str())))?;
        let Some(close) = self.next() else {
            return Err(self.error(open_offset, format!("unclosed `{{` for block `{name}`")));
        };
        let close_offset = close.span.start;

        let is_empty_inline =
            inline_empty(self.source, open_offset, close_offset, !children.is_empty());

        Ok(Node::Block(Block {
            name,
            header,
            children,
            span: Span::new(name_span.start, close.span.end),
            braces: Some(Braces {
                open: open_offset,
                close: close_offset,
            }),
            is_empty_inline,
        }))
    }
}

/// `{}` or `{ }` on one line with nothing between the braces.
pub(crate) fn inline_empty(source: &str, open: usize, close: usize, has_children: bool) -> bool {
    let inner = &source[open + 1..close];
    !has_children && !inner.contains('\n') && inner.trim().is_empty()
}

fn closing_for(token: &Token) -> Option<char> {
    if token.is_symbol(')') {
        Some('(')
    } else if token.is_symbol(']') {
        Some('[')
    } else if token.is_symbol('}') {
        Some('{')
    } else {
        None
    }
}
