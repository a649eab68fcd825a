use crate::edit::Edit;
use crate::gradle::errors::GradleError;
use crate::gradle::pattern::{find, Pattern};
use crate::gradle::tree::{Block, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_INDENT: &str = "    ";

/// How a text property is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderForm {
    /// `name value`, e.g. `implementation 'com.example:lib:1.0'`
    Statement,
    /// `name: value`, e.g. `apply from: 'other.gradle'`
    Property,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Pre-formatted text, inserted verbatim.
    Text { value: String, form: RenderForm },
    /// A nested block: `name { ... }`.
    Block(Vec<PropertyDescriptor>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value: PropertyValue,
}

impl PropertyDescriptor {
    pub fn statement(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Text {
                value: value.into(),
                form: RenderForm::Statement,
            },
        }
    }

    pub fn property(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Text {
                value: value.into(),
                form: RenderForm::Property,
            },
        }
    }

    pub fn block(name: impl Into<String>, children: Vec<PropertyDescriptor>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Block(children),
        }
    }

    pub fn validate(&self) -> Result<(), GradleError> {
        if self.name.trim().is_empty() {
            return Err(GradleError::InvalidProperty {
                name: self.name.clone(),
                message: "name is empty".to_string(),
            });
        }
        if self.name.contains('\n') {
            return Err(GradleError::InvalidProperty {
                name: self.name.clone(),
                message: "name spans multiple lines".to_string(),
            });
        }
        match &self.value {
            PropertyValue::Text {
                value,
                form: RenderForm::Property,
            } if value.trim().is_empty() => {
                return Err(GradleError::InvalidProperty {
                    name: self.name.clone(),
                    message: "property form needs a value".to_string(),
                });
            }
            PropertyValue::Block(children) => {
                for child in children {
                    child.validate()?;
                }
            }
            PropertyValue::Text { .. } => {}
        }
        Ok(())
    }

    /// Append this descriptor's lines, each prefixed with `indent`.
    pub fn render(&self, indent: &str, unit: &str, out: &mut Vec<String>) {
        match &self.value {
            PropertyValue::Text {
                value,
                form: RenderForm::Statement,
            } if value.is_empty() => {
                out.push(format!("{indent}{}", self.name));
            }
            PropertyValue::Text {
                value,
                form: RenderForm::Statement,
            } => out.push(format!("{indent}{} {value}", self.name)),
            PropertyValue::Text {
                value,
                form: RenderForm::Property,
            } => out.push(format!("{indent}{}: {value}", self.name)),
            PropertyValue::Block(children) => {
                out.push(format!("{indent}{} {{", self.name));
                let inner = format!("{indent}{unit}");
                for child in children {
                    child.render(&inner, unit, out);
                }
                out.push(format!("{indent}}}"));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Indentation unit used when none can be inferred from the file.
    pub indent_unit: String,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            indent_unit: DEFAULT_INDENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    ExpandInline,
    AppendBeforeClose,
    AppendToDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    pub edits: Vec<Edit>,
    /// `None` when there was nothing to insert.
    pub placement: Option<Placement>,
    /// Names of blocks synthesized because the path did not exist.
    pub created: Vec<String>,
}

impl InjectionPlan {
    pub fn is_noop(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Plan the injection of `properties` at `pattern`.
///
/// The first match in document order is the target. With no match, the
/// missing blocks are created beneath the deepest existing prefix.
pub fn plan(
    document: &Document,
    pattern: &Pattern,
    properties: &[PropertyDescriptor],
    options: &PlanOptions,
) -> Result<InjectionPlan, GradleError> {
    pattern.validate()?;
    let chain = pattern.chain()?;
    for property in properties {
        property.validate()?;
    }

    let (target, missing) = resolve_target(document, pattern, &chain);
    let created: Vec<String> = missing.iter().map(|name| name.to_string()).collect();

    let items = match missing.split_last() {
        None => properties.to_vec(),
        Some((innermost, outer)) => {
            let leaf = PropertyDescriptor::block(*innermost, properties.to_vec());
            vec![outer
                .iter()
                .rev()
                .fold(leaf, |inner, name| PropertyDescriptor::block(*name, vec![inner]))]
        }
    };

    if items.is_empty() {
        debug!(%pattern, "nothing to inject");
        return Ok(InjectionPlan {
            edits: Vec::new(),
            placement: None,
            created,
        });
    }

    let source = document.source();
    let eol = line_ending(source);
    let unit = infer_unit(source, target, document.root())
        .unwrap_or_else(|| options.indent_unit.clone());

    let (placement, edit) = match target.braces {
        None => (
            Placement::AppendToDocument,
            append_to_document(source, &items, &unit, eol),
        ),
        Some(_) if target.is_empty_inline => (
            Placement::ExpandInline,
            expand_inline(source, target, &items, &unit, eol),
        ),
        Some(_) => (
            Placement::AppendBeforeClose,
            append_before_close(source, target, &items, &unit, eol),
        ),
    };

    debug!(
        %pattern,
        target = %target.name,
        ?placement,
        created = created.len(),
        "planned injection"
    );

    Ok(InjectionPlan {
        edits: edit.into_iter().collect(),
        placement: Some(placement),
        created,
    })
}

/// Target block plus the names that still need creating beneath it.
fn resolve_target<'d, 'p>(
    document: &'d Document,
    pattern: &Pattern,
    chain: &[&'p str],
) -> (&'d Block, Vec<&'p str>) {
    if let Some(first) = find(document, pattern).into_iter().next() {
        return (first, Vec::new());
    }
    for depth in (0..chain.len()).rev() {
        let prefix = Pattern::from_path(chain[..depth].iter().copied());
        if let Some(parent) = find(document, &prefix).into_iter().next() {
            return (parent, chain[depth..].to_vec());
        }
    }
    (document.root(), chain.to_vec())
}

fn render_lines(items: &[PropertyDescriptor], indent: &str, unit: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        item.render(indent, unit, &mut lines);
    }
    lines
}

fn expand_inline(
    source: &str,
    target: &Block,
    items: &[PropertyDescriptor],
    unit: &str,
    eol: &str,
) -> Option<Edit> {
    let braces = target.braces?;
    let indent = line_indent(source, target.span.start);
    let inner = format!("{indent}{unit}");
    let mut text = format!("{{{eol}");
    for line in render_lines(items, &inner, unit) {
        text.push_str(&line);
        text.push_str(eol);
    }
    text.push_str(indent);
    text.push('}');
    let end = braces.close + 1;
    Some(Edit::new(braces.open, end, text, &source[braces.open..end]))
}

fn append_before_close(
    source: &str,
    target: &Block,
    items: &[PropertyDescriptor],
    unit: &str,
    eol: &str,
) -> Option<Edit> {
    let braces = target.braces?;
    let block_indent = line_indent(source, target.span.start);
    let child_indent = target
        .children
        .iter()
        .rev()
        .map(|child| child.span().start)
        .find(|start| starts_line(source, *start))
        .map(|start| line_indent(source, start).to_string())
        .unwrap_or_else(|| format!("{block_indent}{unit}"));
    let lines = render_lines(items, &child_indent, unit);

    let close = braces.close;
    let close_line = line_start(source, close);
    if close_line > braces.open && starts_line(source, close) {
        // `}` sits on its own line: insert whole lines above it.
        let mut text = String::new();
        for line in lines {
            text.push_str(&line);
            text.push_str(eol);
        }
        return Some(Edit::insert(close_line, text));
    }

    // `}` shares a line with content: break the line before it.
    let ws_start = source[..close].trim_end_matches([' ', '\t']).len();
    let mut text = String::from(eol);
    text.push_str(&lines.join(eol));
    text.push_str(eol);
    text.push_str(block_indent);
    Some(Edit::new(ws_start, close, text, &source[ws_start..close]))
}

fn append_to_document(
    source: &str,
    items: &[PropertyDescriptor],
    unit: &str,
    eol: &str,
) -> Option<Edit> {
    let lines = render_lines(items, "", unit);
    let mut text = String::new();
    if !source.is_empty() && !source.ends_with('\n') {
        text.push_str(eol);
    }
    text.push_str(&lines.join(eol));
    if source.is_empty() || source.ends_with('\n') {
        text.push_str(eol);
    }
    Some(Edit::insert(source.len(), text))
}

/// Indentation unit observed under `target`, else anywhere in the file.
fn infer_unit(source: &str, target: &Block, root: &Block) -> Option<String> {
    unit_from_block(source, target).or_else(|| {
        root.walk()
            .into_iter()
            .filter(|block| !block.is_document())
            .find_map(|block| unit_from_block(source, block))
    })
}

fn unit_from_block(source: &str, block: &Block) -> Option<String> {
    let block_indent = if block.is_document() {
        ""
    } else {
        line_indent(source, block.span.start)
    };
    block
        .children
        .iter()
        .map(|child| child.span().start)
        .filter(|start| starts_line(source, *start))
        .map(|start| line_indent(source, start))
        .find(|indent| indent.len() > block_indent.len() && indent.starts_with(block_indent))
        .map(|indent| indent[block_indent.len()..].to_string())
}

/// Line break style of the file, taken from its first line break.
fn line_ending(source: &str) -> &'static str {
    match source.find('\n') {
        Some(idx) if source[..idx].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

/// Leading spaces and tabs of the line containing `offset`.
fn line_indent(source: &str, offset: usize) -> &str {
    let start = line_start(source, offset);
    let line = &source[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// True when only spaces and tabs precede `offset` on its line.
fn starts_line(source: &str, offset: usize) -> bool {
    source[line_start(source, offset)..offset]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}
