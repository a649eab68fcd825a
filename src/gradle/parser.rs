use crate::gradle::errors::GradleError;
use crate::gradle::scanner::{scan, Span, Token, TokenKind};
use crate::gradle::tree::{self, Block, Braces, Document, Node, Statement};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

pub trait SpanTreeParser: Send + Sync {
    /// Short name for logs and error messages.
    fn name(&self) -> &str;

    /// Check that everything the parser needs is present on this host.
    fn probe(&self) -> Result<(), GradleError>;

    fn parse_to_span_tree(&self, text: &str) -> Result<Document, GradleError>;
}

/// The built-in scanner and tree builder. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeParser;

impl SpanTreeParser for NativeParser {
    fn name(&self) -> &str {
        "native"
    }

    fn probe(&self) -> Result<(), GradleError> {
        Ok(())
    }

    fn parse_to_span_tree(&self, text: &str) -> Result<Document, GradleError> {
        Document::parse(text)
    }
}

/// Which backend to use, as written in operation files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserChoice {
    #[default]
    Native,
    External {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl ParserChoice {
    pub fn build(&self) -> Arc<dyn SpanTreeParser> {
        match self {
            ParserChoice::Native => Arc::new(NativeParser),
            ParserChoice::External { program, args } => {
                Arc::new(ExternalParser::new(program.clone(), args.clone()))
            }
        }
    }
}

/// Grammar helper run as a subprocess.
///
/// The script is written to the helper's stdin. On success it prints
/// `{"children": [node...]}` where a node is
/// `{"type": "block", "name", "start", "end", "open", "close", "children"}`
/// or `{"type": "statement", "name", "start", "end"}` (byte offsets). On a
/// syntax error it prints `{"error": {"offset", "message"}}`.
#[derive(Debug, Clone)]
pub struct ExternalParser {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HelperOutput {
    Error { error: HelperError },
    Tree { children: Vec<HelperNode> },
}

#[derive(Debug, Deserialize)]
struct HelperError {
    #[serde(default)]
    offset: usize,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HelperNode {
    Block {
        name: String,
        start: usize,
        end: usize,
        open: usize,
        close: usize,
        #[serde(default)]
        children: Vec<HelperNode>,
    },
    Statement {
        name: String,
        start: usize,
        end: usize,
    },
}

impl ExternalParser {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn helper_name(&self) -> String {
        self.program.display().to_string()
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        if self.program.components().count() > 1 {
            return self.program.is_file().then(|| self.program.clone());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    fn failed(&self, message: impl Into<String>) -> GradleError {
        GradleError::HelperFailed {
            helper: self.helper_name(),
            message: message.into(),
        }
    }

    fn run(&self, program: &Path, text: &str) -> Result<Vec<u8>, GradleError> {
        let mut child = Command::new(program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| GradleError::UnresolvedDependency {
                helper: self.helper_name(),
                reason: err.to_string(),
            })?;

        let stdin = child.stdin.take();
        let input = text.to_string();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });

        let output = child
            .wait_with_output()
            .map_err(|err| self.failed(err.to_string()))?;
        if let Ok(Err(err)) = writer.join() {
            warn!(helper = %self.helper_name(), %err, "helper closed stdin early");
        }

        // A syntax error report may come with a non-zero exit; let the JSON
        // decide before treating the exit status as a crash.
        if !output.status.success() && output.stdout.is_empty() {
            return Err(self.failed(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    fn convert(&self, source: &str, nodes: Vec<HelperNode>, parent: Span) -> Result<Vec<Node>, GradleError> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut last_end = parent.start;
        for node in nodes {
            let converted = match node {
                HelperNode::Block {
                    name,
                    start,
                    end,
                    open,
                    close,
                    children,
                } => {
                    let span = self.checked_span(source, start, end, parent, last_end)?;
                    let bytes = source.as_bytes();
                    if !(start <= open && open < close && close < end)
                        || bytes[open] != b'{'
                        || bytes[close] != b'}'
                    {
                        return Err(self.failed(format!("block `{name}` has bad brace offsets")));
                    }
                    let body = Span::new(open + 1, close);
                    let children = self.convert(source, children, body)?;
                    let header_start = name_end(source, start, open, &name);
                    Node::Block(Block {
                        header: self.tokens_in(source, header_start, open)?,
                        is_empty_inline: tree::inline_empty(source, open, close, !children.is_empty()),
                        children,
                        span,
                        braces: Some(Braces { open, close }),
                        name,
                    })
                }
                HelperNode::Statement { name, start, end } => {
                    let span = self.checked_span(source, start, end, parent, last_end)?;
                    let args_start = name_end(source, start, end, &name);
                    Node::Statement(Statement {
                        args: self.tokens_in(source, args_start, end)?,
                        span,
                        name,
                    })
                }
            };
            last_end = converted.span().end;
            out.push(converted);
        }
        Ok(out)
    }

    fn checked_span(
        &self,
        source: &str,
        start: usize,
        end: usize,
        parent: Span,
        last_end: usize,
    ) -> Result<Span, GradleError> {
        let span = Span::new(start, end);
        let valid = start <= end
            && parent.contains(&span)
            && start >= last_end
            && source.is_char_boundary(start)
            && source.is_char_boundary(end);
        if valid {
            Ok(span)
        } else {
            Err(self.failed(format!("span {start}..{end} is outside its parent or out of order")))
        }
    }

    /// Significant tokens of `source[start..end]` with absolute offsets.
    fn tokens_in(&self, source: &str, start: usize, end: usize) -> Result<Vec<Token>, GradleError> {
        let tokens = scan(&source[start..end]).map_err(|err| self.failed(err.to_string()))?;
        Ok(tokens
            .into_iter()
            .filter(|t| !t.is_trivia() && t.kind != TokenKind::Newline)
            .map(|mut t| {
                t.span = Span::new(t.span.start + start, t.span.end + start);
                t
            })
            .collect())
    }
}

/// Offset just past `name` at `start`, never beyond `limit`.
fn name_end(source: &str, start: usize, limit: usize, name: &str) -> usize {
    if source[start..limit].starts_with(name) {
        start + name.len()
    } else {
        start
    }
}

impl SpanTreeParser for ExternalParser {
    fn name(&self) -> &str {
        "external"
    }

    fn probe(&self) -> Result<(), GradleError> {
        match self.resolve_program() {
            Some(path) => {
                debug!(helper = %path.display(), "grammar helper found");
                Ok(())
            }
            None => Err(GradleError::UnresolvedDependency {
                helper: self.helper_name(),
                reason: "not found on PATH".to_string(),
            }),
        }
    }

    fn parse_to_span_tree(&self, text: &str) -> Result<Document, GradleError> {
        let program = self.resolve_program().ok_or_else(|| GradleError::UnresolvedDependency {
            helper: self.helper_name(),
            reason: "not found on PATH".to_string(),
        })?;
        let stdout = self.run(&program, text)?;
        let output: HelperOutput = serde_json::from_slice(&stdout)
            .map_err(|err| self.failed(format!("unreadable output: {err}")))?;

        match output {
            HelperOutput::Error { error } => Err(GradleError::parse(text, error.offset, error.message)),
            HelperOutput::Tree { children } => {
                let whole = Span::new(0, text.len());
                let children = self.convert(text, children, whole)?;
                let root = Block {
                    name: String::new(),
                    header: Vec::new(),
                    children,
                    span: whole,
                    braces: None,
                    is_empty_inline: false,
                };
                Ok(Document::from_parts(text.to_string(), root))
            }
        }
    }
}
