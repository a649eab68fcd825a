use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gradle_patcher::config::{
    apply_operations, discover, load_from_path, ApplyOptions, OperationConfig, OperationResult,
    OPERATIONS_DIR,
};
use gradle_patcher::gradle::{ExternalParser, GradleError, GradleFile, NodeKind, Pattern};
use gradle_patcher::vfs::{StagedChange, Vfs};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gradle-patcher")]
#[command(about = "Lossless structural patching of Gradle build scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors and the summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply operation files to a project
    Apply {
        /// Specific operation file (otherwise all in <root>/gradle-patches/)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Show what would change without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Continue after a failed operation and commit the rest
        #[arg(long)]
        keep_going: bool,
    },

    /// Print the blocks matching a pattern as JSON
    Find {
        /// Build script to search
        #[arg(short, long)]
        file: PathBuf,

        /// Nested block pattern, e.g. '{"buildscript": {"dependencies": {}}}'
        #[arg(short, long, default_value = "{}")]
        pattern: String,

        /// Parse with an external grammar helper program
        #[arg(long)]
        helper: Option<PathBuf>,
    },

    /// Check that a build script can be parsed on this host
    Check {
        /// Build script to check
        #[arg(short, long)]
        file: PathBuf,

        /// Parse with an external grammar helper program
        #[arg(long)]
        helper: Option<PathBuf>,
    },

    /// List operations in the discovered operation files
    List {
        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            config,
            root,
            dry_run,
            yes,
            keep_going,
        } => {
            cmd_apply(
                config,
                root,
                ApplyFlags {
                    dry_run,
                    yes,
                    keep_going,
                    quiet: cli.quiet,
                },
            )
            .await
        }
        Commands::Find {
            file,
            pattern,
            helper,
        } => cmd_find(file, &pattern, helper).await,
        Commands::Check { file, helper } => cmd_check(file, helper, cli.quiet).await,
        Commands::List { root } => cmd_list(root),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gradle_patcher={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

struct ApplyFlags {
    dry_run: bool,
    yes: bool,
    keep_going: bool,
    quiet: bool,
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(path) => path,
        None => env::current_dir().context("cannot determine current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("project root {} does not exist", root.display()))
}

fn operation_files(root: &Path, explicit: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(vec![path]);
    }
    let files = discover(root)?;
    if files.is_empty() {
        anyhow::bail!(
            "No .toml operation files found in {}",
            root.join(OPERATIONS_DIR).display()
        );
    }
    Ok(files)
}

fn print_operation(config: &OperationConfig, id: &str, display: &str) {
    let group = if config.meta.name.is_empty() {
        "gradle"
    } else {
        config.meta.name.as_str()
    };
    println!("{} {} {}", group.green().bold(), id.bold(), display);
}

/// Show unified diff between original and staged content
fn display_diff(root: &Path, change: &StagedChange) {
    let shown = change.path.strip_prefix(root).unwrap_or(&change.path);
    let original = change.original.as_deref().unwrap_or("");
    println!("\n{}", format!("--- {} (original)", shown.display()).dimmed());
    println!("{}", format!("+++ {} (patched)", shown.display()).dimmed());

    let diff = TextDiff::from_lines(original, change.content.as_str());
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt.bold());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

async fn cmd_apply(config: Option<PathBuf>, root: Option<PathBuf>, flags: ApplyFlags) -> Result<()> {
    // 1. Resolve project root and operation files
    let root = resolve_root(root)?;
    let files = operation_files(&root, config)?;
    let vfs = Arc::new(Vfs::new(&root)?);

    if !flags.quiet {
        println!("Project: {}", root.display());
        println!();
    }

    // 2. Stage every operation
    let mut total_applied = 0;
    let mut total_unchanged = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for file in files {
        let config = load_from_path(&file)?;
        if !flags.quiet {
            println!("Loading operations from {}...", file.display());
            for operation in &config.operations {
                print_operation(&config, &operation.id, &operation.display_text());
            }
        }

        let options = ApplyOptions {
            keep_going: flags.keep_going,
        };
        let results = apply_operations(&config, vfs.clone(), options).await;

        for (id, result) in results {
            match result {
                Ok(outcome @ OperationResult::Applied { .. }) => {
                    if !flags.quiet {
                        println!("{} {}: {}", "✓".green(), id, outcome);
                    }
                    total_applied += 1;
                }
                Ok(outcome @ OperationResult::Unchanged { .. }) => {
                    if !flags.quiet {
                        println!("{} {}: {}", "⊙".yellow(), id, outcome);
                    }
                    total_unchanged += 1;
                }
                Ok(outcome @ OperationResult::Skipped { .. }) => {
                    println!("{} {}: {}", "⊘".cyan(), id, outcome);
                    total_skipped += 1;
                }
                Err(err) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), id, err);
                    if err.is_unresolved_dependency() {
                        eprintln!(
                            "  {}",
                            "The configured grammar helper is not installed on this host".yellow()
                        );
                    }
                    total_failed += 1;
                }
            }
        }
        if !flags.quiet {
            println!();
        }

        if total_failed > 0 && !flags.keep_going {
            break;
        }
    }

    // 3. Preview, confirm, commit
    let staged = vfs.staged().await;
    let abort = total_failed > 0 && !flags.keep_going;

    if !flags.quiet {
        for change in &staged {
            display_diff(&root, change);
        }
        if !staged.is_empty() {
            println!();
        }
    }

    if abort {
        vfs.discard().await;
        eprintln!("{}", "Operation failed; no files were written".red());
    } else if staged.is_empty() {
        println!("{}", "Nothing to change".dimmed());
    } else if flags.dry_run {
        vfs.discard().await;
        println!("{}", "[DRY RUN - no files were written]".cyan());
    } else {
        let approved = flags.yes
            || confirm(
                "Apply changes?\nApplying these changes will modify your build scripts. \
                 Commit your work before continuing.\nApply?",
            )?;
        if approved {
            if flags.yes {
                tracing::info!("--yes provided, applying without confirmation");
            }
            let committed = vfs.commit_all().await?;
            for path in committed {
                let shown = path.strip_prefix(&root).unwrap_or(&path);
                println!("{} wrote {}", "✓".green(), shown.display());
            }
        } else {
            vfs.discard().await;
            println!("{}", "Aborted; no files were written".yellow());
        }
    }

    // 4. Summary
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!("  {} unchanged", format!("{}", total_unchanged).yellow());
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn open_file(file: &Path, helper: Option<PathBuf>) -> Result<GradleFile> {
    let root = env::current_dir().context("cannot determine current directory")?;
    let vfs = Arc::new(Vfs::new(&root)?);
    let mut gradle = GradleFile::new(file, vfs);
    if let Some(program) = helper {
        gradle = gradle.with_parser(Arc::new(ExternalParser::new(program, Vec::new())));
    }
    Ok(gradle)
}

async fn cmd_find(file: PathBuf, pattern: &str, helper: Option<PathBuf>) -> Result<()> {
    let pattern: Pattern =
        serde_json::from_str(pattern).context("pattern must be a JSON object of objects")?;
    let gradle = open_file(&file, helper)?;
    let matches = gradle.find(&pattern).await?;
    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}

async fn cmd_check(file: PathBuf, helper: Option<PathBuf>, quiet: bool) -> Result<()> {
    let gradle = open_file(&file, helper)?;

    match gradle.outline().await {
        Ok(outline) => {
            println!("{} {} parses", "✓".green(), file.display());
            if !quiet {
                for node in outline {
                    let kind = match node.kind {
                        NodeKind::Block => "block",
                        NodeKind::Statement => "statement",
                        NodeKind::Document => "document",
                    };
                    println!("  {:>4}  {:<9} {}", node.line, kind.dimmed(), node.name);
                }
            }
            Ok(())
        }
        Err(err @ GradleError::UnresolvedDependency { .. }) => {
            eprintln!("{} {}", "⊘".yellow(), err);
            std::process::exit(2);
        }
        Err(err) if err.is_syntax_error() => {
            eprintln!("{} {}: {}", "✗".red(), file.display(), err);
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_list(root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let files = operation_files(&root, None)?;

    for file in files {
        let config = load_from_path(&file)?;
        let title = if config.meta.name.is_empty() {
            file.display().to_string()
        } else {
            format!("{} ({})", config.meta.name, file.display())
        };
        println!("{}", title.bold());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }
        for operation in &config.operations {
            println!(
                "  - {} [{}] {}",
                operation.id,
                operation.file,
                operation.display_text()
            );
        }
        println!();
    }
    Ok(())
}
