use crate::edit::apply_edits;
use crate::gradle::errors::{GradleError, Position};
use crate::gradle::parser::{NativeParser, SpanTreeParser};
use crate::gradle::pattern::{self, Pattern};
use crate::gradle::planner::{self, InjectionPlan, PlanOptions, PropertyDescriptor};
use crate::gradle::scanner::Span;
use crate::gradle::tree::{Block, Document, Node};
use crate::vfs::StagedFs;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Document,
    Block,
    Statement,
}

/// Serializable summary of a node, detached from the parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub span: Span,
    /// 1-based line of the node's first byte.
    pub line: usize,
    pub is_empty_inline: bool,
}

impl NodeInfo {
    fn from_block(source: &str, block: &Block) -> Self {
        Self {
            kind: if block.is_document() {
                NodeKind::Document
            } else {
                NodeKind::Block
            },
            name: block.name.clone(),
            span: block.span,
            line: Position::locate(source, block.span.start).line,
            is_empty_inline: block.is_empty_inline,
        }
    }

    fn from_node(source: &str, node: &Node) -> Self {
        match node {
            Node::Block(block) => Self::from_block(source, block),
            Node::Statement(statement) => Self {
                kind: NodeKind::Statement,
                name: statement.name.clone(),
                span: statement.span,
                line: Position::locate(source, statement.span.start).line,
                is_empty_inline: false,
            },
        }
    }
}

/// A build script reached through a staged file system.
#[derive(Clone)]
pub struct GradleFile {
    path: PathBuf,
    fs: Arc<dyn StagedFs>,
    parser: Arc<dyn SpanTreeParser>,
    options: PlanOptions,
}

impl std::fmt::Debug for GradleFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradleFile")
            .field("path", &self.path)
            .field("parser", &self.parser.name())
            .field("options", &self.options)
            .finish()
    }
}

impl GradleFile {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn StagedFs>) -> Self {
        Self {
            path: path.into(),
            fs,
            parser: Arc::new(NativeParser),
            options: PlanOptions::default(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SpanTreeParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this host can parse the file at all.
    ///
    /// Fails with [`GradleError::UnresolvedDependency`] when the configured
    /// grammar helper is missing; never reads the file.
    pub fn probe(&self) -> Result<(), GradleError> {
        self.parser.probe()
    }

    /// Parse the current staged content.
    pub async fn document(&self) -> Result<Document, GradleError> {
        self.probe()?;
        let text = self.fs.read(&self.path).await?;
        self.parse(text).await
    }

    /// Run the parser off the async workers; a helper may block on its pipes.
    async fn parse(&self, text: String) -> Result<Document, GradleError> {
        let parser = self.parser.clone();
        tokio::task::spawn_blocking(move || parser.parse_to_span_tree(&text))
            .await
            .map_err(|err| GradleError::HelperFailed {
                helper: self.parser.name().to_string(),
                message: err.to_string(),
            })?
    }

    /// Top-level nodes of the file, for a quick structural overview.
    pub async fn outline(&self) -> Result<Vec<NodeInfo>, GradleError> {
        let document = self.document().await?;
        let source = document.source();
        Ok(document
            .root()
            .children
            .iter()
            .map(|node| NodeInfo::from_node(source, node))
            .collect())
    }

    /// Blocks matching `pattern`, in document order. No match is `Ok(vec![])`.
    pub async fn find(&self, pattern: &Pattern) -> Result<Vec<NodeInfo>, GradleError> {
        pattern.validate()?;
        let document = self.document().await?;
        let source = document.source();
        let matches: Vec<NodeInfo> = pattern::find(&document, pattern)
            .into_iter()
            .map(|block| NodeInfo::from_block(source, block))
            .collect();
        debug!(path = %self.path.display(), %pattern, matches = matches.len(), "find");
        Ok(matches)
    }

    /// Insert `properties` at `pattern`, creating missing blocks.
    ///
    /// The result is written back to the staged file system only if the
    /// spliced text still parses; on any error nothing is written.
    pub async fn inject_properties(
        &self,
        pattern: &Pattern,
        properties: &[PropertyDescriptor],
    ) -> Result<InjectionPlan, GradleError> {
        let document = self.document().await?;
        let plan = planner::plan(&document, pattern, properties, &self.options)?;
        if plan.is_noop() {
            return Ok(plan);
        }

        let updated = apply_edits(document.source(), &plan.edits)?;
        self.parse(updated.clone())
            .await
            .map_err(|err| match err {
                err if err.is_syntax_error() => GradleError::PostEditParse {
                    file: self.path.clone(),
                    message: err.to_string(),
                },
                other => other,
            })?;

        self.fs.write(&self.path, updated).await?;
        info!(
            path = %self.path.display(),
            %pattern,
            placement = ?plan.placement,
            created = ?plan.created,
            "injected {} properties",
            properties.len()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradle::parser::ExternalParser;
    use crate::gradle::planner::Placement;
    use crate::vfs::Vfs;
    use std::fs;

    fn setup(source: &str) -> (tempfile::TempDir, Arc<Vfs>, GradleFile) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.gradle"), source).unwrap();
        let vfs = Arc::new(Vfs::new(dir.path()).unwrap());
        let file = GradleFile::new("build.gradle", vfs.clone());
        (dir, vfs, file)
    }

    #[tokio::test]
    async fn find_reports_blocks_with_lines() {
        let (_dir, _vfs, file) = setup("a {}\nb {\n    c {}\n}\n");
        let found = file.find(&Pattern::from_path(["b", "c"])).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, NodeKind::Block);
        assert_eq!(found[0].name, "c");
        assert_eq!(found[0].line, 3);
        assert!(found[0].is_empty_inline);

        let root = file.find(&Pattern::root()).await.unwrap();
        assert_eq!(root[0].kind, NodeKind::Document);
    }

    #[tokio::test]
    async fn inject_stages_without_committing() {
        let (dir, vfs, file) = setup("dependencies {}\n");
        let plan = file
            .inject_properties(
                &Pattern::from_path(["dependencies"]),
                &[PropertyDescriptor::statement("implementation", "'a:b:1'")],
            )
            .await
            .unwrap();
        assert_eq!(plan.placement, Some(Placement::ExpandInline));

        assert_eq!(
            fs::read_to_string(dir.path().join("build.gradle")).unwrap(),
            "dependencies {}\n"
        );
        let staged = vfs.staged().await;
        assert_eq!(staged[0].content, "dependencies {\n    implementation 'a:b:1'\n}\n");
    }

    #[tokio::test]
    async fn successive_injections_see_staged_content() {
        let (_dir, vfs, file) = setup("");
        let target = Pattern::from_path(["android", "defaultConfig"]);
        file.inject_properties(&target, &[PropertyDescriptor::statement("minSdk", "21")])
            .await
            .unwrap();
        file.inject_properties(&target, &[PropertyDescriptor::statement("targetSdk", "34")])
            .await
            .unwrap();

        let content = vfs.read(Path::new("build.gradle")).await.unwrap();
        assert_eq!(
            content,
            "android {\n    defaultConfig {\n        minSdk 21\n        targetSdk 34\n    }\n}\n"
        );
    }

    #[tokio::test]
    async fn unparseable_result_writes_nothing() {
        let (_dir, vfs, file) = setup("a {}\n");
        let err = file
            .inject_properties(
                &Pattern::from_path(["a"]),
                &[PropertyDescriptor::statement("broken", "'unterminated")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradleError::PostEditParse { .. }));
        assert!(vfs.staged().await.is_empty());
    }

    #[tokio::test]
    async fn syntax_error_is_distinct_from_missing_helper() {
        let (_dir, _vfs, file) = setup("a {\n");
        let err = file.find(&Pattern::root()).await.unwrap_err();
        assert!(err.is_syntax_error());

        let file = file.with_parser(Arc::new(ExternalParser::new(
            "gradle-span-tree-definitely-missing",
            Vec::new(),
        )));
        assert!(file.probe().unwrap_err().is_unresolved_dependency());
        let err = file.find(&Pattern::root()).await.unwrap_err();
        assert!(err.is_unresolved_dependency());
    }

    #[tokio::test]
    async fn missing_file_is_vfs_error() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = Arc::new(Vfs::new(dir.path()).unwrap());
        let file = GradleFile::new("nope.gradle", vfs);
        let err = file.find(&Pattern::root()).await.unwrap_err();
        assert!(matches!(err, GradleError::Vfs(_)));
    }

    #[test]
    fn node_info_serializes_kind_as_type() {
        let info = NodeInfo {
            kind: NodeKind::Block,
            name: "android".to_string(),
            span: Span::new(0, 10),
            line: 1,
            is_empty_inline: false,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "block");
        assert!(json.get("kind").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_helper_runs_off_the_async_thread() {
        let (dir, _vfs, file) = setup("a {}\n");
        let ready = dir.path().join("ready");
        let script = dir.path().join("helper.sh");
        fs::write(
            &script,
            format!(
                r#"cat > /dev/null
i=0
while [ ! -f '{}' ]; do
  i=$((i+1))
  [ $i -gt 50 ] && exit 3
  sleep 0.1
done
echo '{{"children": [{{"type": "block", "name": "a", "start": 0, "end": 4, "open": 2, "close": 3}}]}}'
"#,
                ready.display()
            ),
        )
        .unwrap();
        let file = file.with_parser(Arc::new(ExternalParser::new(
            "sh",
            vec![script.display().to_string()],
        )));

        // The helper waits for a file that only this runtime's other task writes.
        let (document, written) = tokio::join!(file.document(), tokio::fs::write(&ready, b""));
        written.unwrap();
        assert_eq!(document.unwrap().root().children.len(), 1);
    }

    #[tokio::test]
    async fn outline_lists_top_level_nodes() {
        let (_dir, _vfs, file) = setup("apply plugin: 'com.android.application'\nandroid {}\n");
        let outline = file.outline().await.unwrap();
        let kinds: Vec<NodeKind> = outline.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NodeKind::Statement, NodeKind::Block]);
    }
}
