use crate::gradle::errors::GradleError;
use crate::gradle::tree::{Block, Document};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(IndexMap<String, Pattern>);

impl Pattern {
    /// The empty pattern; matches the document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-chain pattern: `from_path(["a", "b"])` is `{a: {b: {}}}`.
    pub fn from_path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        segments
            .into_iter()
            .rev()
            .fold(Pattern::root(), |inner, name| {
                let mut map = IndexMap::new();
                map.insert(name, inner);
                Pattern(map)
            })
    }

    /// Add `name` at this level, returning the extended pattern.
    pub fn with(mut self, name: impl Into<String>, child: Pattern) -> Self {
        self.0.insert(name.into(), child);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.0.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Pattern)> {
        self.0.iter().map(|(name, child)| (name.as_str(), child))
    }

    /// Reject empty or multi-line names anywhere in the tree.
    pub fn validate(&self) -> Result<(), GradleError> {
        for (name, child) in &self.0 {
            if name.trim().is_empty() {
                return Err(GradleError::InvalidPattern {
                    message: "empty block name".to_string(),
                });
            }
            if name.chars().any(char::is_whitespace) {
                return Err(GradleError::InvalidPattern {
                    message: format!("block name '{name}' contains whitespace"),
                });
            }
            child.validate()?;
        }
        Ok(())
    }

    /// The names along a single-chain pattern, outermost first.
    ///
    /// Injection needs exactly one target path, so a level with more than
    /// one key is rejected here.
    pub fn chain(&self) -> Result<Vec<&str>, GradleError> {
        let mut names = Vec::new();
        let mut level = self;
        while let Some((name, child)) = level.0.first() {
            if level.0.len() > 1 {
                return Err(GradleError::InvalidPattern {
                    message: format!(
                        "injection needs a single path, found {} names at depth {}",
                        level.0.len(),
                        names.len()
                    ),
                });
            }
            names.push(name.as_str());
            level = child;
        }
        Ok(names)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (name, child)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {child}")?;
        }
        write!(f, "}}")
    }
}

/// All blocks selected by `pattern`, in document order.
///
/// The empty pattern selects the document root itself. An empty sub-pattern
/// matches a block whatever it contains. No match is an empty vector.
pub fn find<'d>(document: &'d Document, pattern: &Pattern) -> Vec<&'d Block> {
    let mut out = Vec::new();
    collect(document.root(), pattern, &mut out);
    out
}

fn collect<'d>(block: &'d Block, pattern: &Pattern, out: &mut Vec<&'d Block>) {
    if pattern.is_empty() {
        out.push(block);
        return;
    }
    for child in block.blocks() {
        if let Some(sub) = pattern.get(&child.name) {
            collect(child, sub, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
buildscript {
    dependencies {
        classpath 'a'
    }
}
android {
    dependencies {}
}
dependencies {
    implementation 'b'
}
dependencies {
    implementation 'c'
}
";

    fn pattern(json: &str) -> Pattern {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn empty_pattern_returns_root() {
        let doc = Document::parse(SOURCE).unwrap();
        let matches = find(&doc, &Pattern::root());
        assert_eq!(matches.len(), 1);
        assert!(std::ptr::eq(matches[0], doc.root()));
    }

    #[test]
    fn scoped_matching() {
        let doc = Document::parse(SOURCE).unwrap();
        let matches = find(&doc, &pattern(r#"{"buildscript": {"dependencies": {}}}"#));
        assert_eq!(matches.len(), 1);
        assert!(doc.text(matches[0].span).contains("classpath 'a'"));
    }

    #[test]
    fn identical_siblings_in_file_order() {
        let doc = Document::parse(SOURCE).unwrap();
        let matches = find(&doc, &Pattern::from_path(["dependencies"]));
        assert_eq!(matches.len(), 2);
        assert!(doc.text(matches[0].span).contains("'b'"));
        assert!(doc.text(matches[1].span).contains("'c'"));
    }

    #[test]
    fn empty_subpattern_is_wildcard_on_shape() {
        let doc = Document::parse(SOURCE).unwrap();
        let matches = find(&doc, &Pattern::from_path(["buildscript"]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].children.len(), 1);
    }

    #[test]
    fn multiple_keys_keep_document_order() {
        let doc = Document::parse(SOURCE).unwrap();
        let query = Pattern::root()
            .with("dependencies", Pattern::root())
            .with("android", Pattern::root());
        let names: Vec<&str> = find(&doc, &query).iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["android", "dependencies", "dependencies"]);
    }

    #[test]
    fn no_match_is_empty() {
        let doc = Document::parse(SOURCE).unwrap();
        assert!(find(&doc, &Pattern::from_path(["ios", "pods"])).is_empty());
    }

    #[test]
    fn statements_are_not_matched() {
        let doc = Document::parse(SOURCE).unwrap();
        assert!(find(&doc, &Pattern::from_path(["dependencies", "implementation"])).is_empty());
    }

    #[test]
    fn chain_and_validation() {
        let chain = pattern(r#"{"allprojects": {"repositories": {}}}"#);
        assert_eq!(chain.chain().unwrap(), vec!["allprojects", "repositories"]);
        assert!(Pattern::root().chain().unwrap().is_empty());

        let forked = pattern(r#"{"a": {}, "b": {}}"#);
        assert!(matches!(
            forked.chain(),
            Err(GradleError::InvalidPattern { .. })
        ));

        assert!(pattern(r#"{"": {}}"#).validate().is_err());
        assert!(pattern(r#"{"a b": {}}"#).validate().is_err());
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn display_is_readable() {
        let query = Pattern::from_path(["buildscript", "dependencies"]);
        assert_eq!(query.to_string(), "{buildscript: {dependencies: {}}}");
    }
}
