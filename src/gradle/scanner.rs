use crate::gradle::errors::GradleError;
use serde::Serialize;

/// Half-open byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    String,
    Number,
    /// Any single punctuation character: braces, parens, `=`, `:`, `.`, ...
    Symbol,
    Comment,
    /// Horizontal whitespace (never contains `\n`).
    Whitespace,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    /// Whitespace and comments: tokens the tree builder steps over.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol
            && self.text.len() == symbol.len_utf8()
            && self.text.starts_with(symbol)
    }
}

/// Tokenize `source`. Fails only on unterminated strings and block comments.
pub fn scan(source: &str) -> Result<Vec<Token>, GradleError> {
    Scanner::new(source).run()
}

struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, GradleError> {
        if self.source.starts_with("#!") {
            self.pos = self.line_end(0);
            self.push(TokenKind::Comment, 0, self.pos);
        }

        while let Some(c) = self.peek() {
            let start = self.pos;
            let kind = match c {
                '\n' => {
                    self.pos += 1;
                    TokenKind::Newline
                }
                c if c.is_whitespace() => {
                    self.eat_while(|c| c.is_whitespace() && c != '\n');
                    TokenKind::Whitespace
                }
                '/' if self.rest().starts_with("//") => {
                    self.pos = self.line_end(self.pos);
                    TokenKind::Comment
                }
                '/' if self.rest().starts_with("/*") => {
                    let close = self.source[start + 2..].find("*/").ok_or_else(|| {
                        GradleError::lex(self.source, start, "unterminated block comment")
                    })?;
                    self.pos = start + 2 + close + 2;
                    TokenKind::Comment
                }
                '\'' | '"' => {
                    self.pos = self.string_end(start)?;
                    TokenKind::String
                }
                c if c.is_ascii_digit() => {
                    self.eat_number();
                    TokenKind::Number
                }
                c if is_ident_start(c) => {
                    self.eat_while(is_ident_continue);
                    TokenKind::Identifier
                }
                c => {
                    self.pos += c.len_utf8();
                    TokenKind::Symbol
                }
            };
            self.push(kind, start, self.pos);
        }

        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            text: self.source[start..end].to_string(),
            span: Span::new(start, end),
        });
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat_number(&mut self) {
        while let Some(c) = self.peek() {
            let fraction = c == '.'
                && self.source[self.pos + 1..]
                    .chars()
                    .next()
                    .is_some_and(|n| n.is_ascii_digit());
            if !(c.is_ascii_alphanumeric() || c == '_' || fraction) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Offset of the next `\n` at or after `from` (exclusive of it), or EOF.
    fn line_end(&self, from: usize) -> usize {
        self.source[from..]
            .find('\n')
            .map(|idx| from + idx)
            .unwrap_or(self.source.len())
    }

    /// End offset of the string literal opening at `start`.
    fn string_end(&self, start: usize) -> Result<usize, GradleError> {
        let bytes = self.source.as_bytes();
        let quote = bytes[start];
        let triple = bytes.get(start + 1) == Some(&quote) && bytes.get(start + 2) == Some(&quote);
        let interpolates = quote == b'"';
        let mut i = if triple { start + 3 } else { start + 1 };

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\n' if !triple => break,
                b'$' if interpolates && bytes.get(i + 1) == Some(&b'{') => {
                    i = self.interpolation_end(i + 2)?;
                }
                b if b == quote => {
                    if !triple {
                        return Ok(i + 1);
                    }
                    if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                        return Ok(i + 3);
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }

        Err(GradleError::lex(
            self.source,
            start,
            "unterminated string literal",
        ))
    }

    /// Skip a `${ ... }` body starting just after the `{`, returning the
    /// offset after its closing brace. Nested strings are skipped whole.
    fn interpolation_end(&self, mut i: usize) -> Result<usize, GradleError> {
        let bytes = self.source.as_bytes();
        let open = i - 2;
        let mut depth = 1usize;
        while i < bytes.len() {
            match bytes[i] {
                b'{' => {
                    depth += 1;
                    i += 1;
                }
                b'}' => {
                    depth -= 1;
                    i += 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                b'\'' | b'"' => i = self.string_end(i)?,
                _ => i += 1,
            }
        }
        Err(GradleError::lex(
            self.source,
            open,
            "unterminated string interpolation",
        ))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.kind)
            .collect()
    }

    fn concat(tokens: &[Token]) -> String {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn scans_statement() {
        assert_eq!(
            kinds("implementation 'com.example:lib:1.0'\n"),
            vec![TokenKind::Identifier, TokenKind::String, TokenKind::Newline]
        );
    }

    #[test]
    fn comments_and_whitespace_are_tokens() {
        let source = "// header\nandroid { /* inline */ }\n";
        let tokens = scan(source).unwrap();
        assert_eq!(concat(&tokens), source);
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "// header");
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        let source = "x '''a\nb'''\n";
        let tokens = scan(source).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[2].text, "'''a\nb'''");
    }

    #[test]
    fn interpolation_with_nested_quotes() {
        let source = "x \"${project.property(\"v\")}-suffix\"";
        let tokens = scan(source).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].kind, TokenKind::String);
    }

    #[test]
    fn escaped_quote_does_not_terminate() {
        let tokens = scan(r"x 'it\'s'").unwrap();
        assert_eq!(tokens[2].text, r"'it\'s'");
    }

    #[test]
    fn numbers_with_fraction_and_suffix() {
        let tokens = scan("v 1.5f").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].text, "1.5f");
    }

    #[test]
    fn unterminated_string_is_lex_error() {
        let err = scan("x 'abc\n").unwrap_err();
        assert!(matches!(err, GradleError::Lex { .. }));
    }

    #[test]
    fn unterminated_comment_is_lex_error() {
        let err = scan("x /* never closed").unwrap_err();
        match err {
            GradleError::Lex { position, .. } => assert_eq!(position.column, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unicode_passes_through() {
        let source = "name 'café' // ünïcode\n";
        assert_eq!(concat(&scan(source).unwrap()), source);
    }

    proptest! {
        #[test]
        fn scan_is_lossless(source in "[a-z{}()'\" \n\t:=.,0-9/*]{0,64}") {
            if let Ok(tokens) = scan(&source) {
                prop_assert_eq!(concat(&tokens), source);
            }
        }
    }
}
