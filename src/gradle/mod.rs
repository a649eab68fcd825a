//! Lossless structural editing of Groovy-DSL Gradle build scripts.
//!
//! The pipeline is `scan -> build -> find -> plan -> apply_edits`:
//!
//! - [`scanner`] splits the text into tokens, keeping whitespace and comments;
//! - [`tree`] builds a span tree of blocks and statements;
//! - [`pattern`] selects blocks with a nested-name query;
//! - [`planner`] turns an injection request into byte-span edits;
//! - [`engine`] ties it to a staged file system for one file.
//!
//! Bytes outside the planned edits are never rewritten.
//!
//! # Example
//!
//! ```
//! use gradle_patcher::edit::apply_edits;
//! use gradle_patcher::gradle::{plan, Document, Pattern, PlanOptions, PropertyDescriptor};
//!
//! let source = "dependencies {}\n";
//! let document = Document::parse(source).unwrap();
//! let injection = plan(
//!     &document,
//!     &Pattern::from_path(["dependencies"]),
//!     &[PropertyDescriptor::statement("implementation", "'com.example:lib:1.0'")],
//!     &PlanOptions::default(),
//! )
//! .unwrap();
//!
//! let patched = apply_edits(source, &injection.edits).unwrap();
//! assert_eq!(patched, "dependencies {\n    implementation 'com.example:lib:1.0'\n}\n");
//! ```

pub mod engine;
pub mod errors;
pub mod parser;
pub mod pattern;
pub mod planner;
pub mod scanner;
pub mod tree;

pub use engine::{GradleFile, NodeInfo, NodeKind};
pub use errors::{GradleError, Position};
pub use parser::{ExternalParser, NativeParser, ParserChoice, SpanTreeParser};
pub use pattern::{find, Pattern};
pub use planner::{
    plan, InjectionPlan, PlanOptions, Placement, PropertyDescriptor, PropertyValue, RenderForm,
    DEFAULT_INDENT,
};
pub use scanner::{scan, Span, Token, TokenKind};
pub use tree::{build, Block, Braces, Document, Node, Statement};
