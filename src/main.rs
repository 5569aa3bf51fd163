use std::fs;
use std::path::{Path, PathBuf};

use askama_grammar::{
    Code, Config, Diagnostic, LANGUAGE, Parser as TemplateParser, Syntax, Tree, load_check,
    node_types_json,
};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "askama-grammar")]
#[command(about = "Askama template grammar loader and parser")]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the grammar can be loaded
    Load,
    /// Print the syntax tree of a template as an S-expression
    Parse {
        file: PathBuf,
        #[command(flatten)]
        syntax: SyntaxArgs,
    },
    /// Report syntax errors in one or more templates
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        syntax: SyntaxArgs,
    },
    /// Print the grammar's node kinds and fields as JSON
    NodeTypes,
}

#[derive(Debug, Args)]
struct SyntaxArgs {
    /// askama.toml providing [[syntax]] delimiter sets
    #[arg(long)]
    config: Option<PathBuf>,
    /// Name of the syntax to use (defaults to the config's default_syntax)
    #[arg(long)]
    syntax: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Command::Load => run_load(),
        Command::Parse { file, syntax } => run_parse(&file, &syntax),
        Command::Check { files, syntax } => run_check(&files, &syntax),
        Command::NodeTypes => run_node_types(),
    };
    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();
}

fn run_load() -> i32 {
    match load_check(LANGUAGE) {
        Ok(_) => {
            println!("ok");
            0
        }
        Err(err) => {
            eprintln!("E-LOAD: {err}");
            1
        }
    }
}

fn run_node_types() -> i32 {
    let language = match load_check(LANGUAGE) {
        Ok(language) => language,
        Err(err) => {
            eprintln!("E-LOAD: {err}");
            return 1;
        }
    };
    match node_types_json(&language) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(err) => {
            eprintln!("E-IO: failed to render node types: {err}");
            1
        }
    }
}

fn run_parse(file: &Path, args: &SyntaxArgs) -> i32 {
    let syntax = match resolve_syntax(args) {
        Ok(syntax) => syntax,
        Err(diags) => return report(&diags),
    };
    let (src, tree) = match parse_file(file, syntax) {
        Ok(parsed) => parsed,
        Err(diags) => return report(&diags),
    };
    debug!(bytes = src.len(), "printing syntax tree");
    println!("{}", tree.to_sexp());
    if tree.has_error() {
        report(&file_diagnostics(file, &tree))
    } else {
        0
    }
}

fn run_check(files: &[PathBuf], args: &SyntaxArgs) -> i32 {
    let syntax = match resolve_syntax(args) {
        Ok(syntax) => syntax,
        Err(diags) => return report(&diags),
    };

    let mut failed = false;
    for file in files {
        match parse_file(file, syntax.clone()) {
            Ok((_, tree)) if !tree.has_error() => {}
            Ok((_, tree)) => {
                report(&file_diagnostics(file, &tree));
                failed = true;
            }
            Err(diags) => {
                report(&diags);
                failed = true;
            }
        }
    }

    if failed {
        1
    } else {
        println!("ok");
        0
    }
}

fn resolve_syntax(args: &SyntaxArgs) -> Result<Syntax, Vec<Diagnostic>> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    match &args.syntax {
        Some(name) => config.syntax(name).cloned().ok_or_else(|| {
            vec![Diagnostic::new(
                Code::Config,
                format!("unknown syntax '{name}'"),
            )]
        }),
        None => Ok(config.default_syntax().clone()),
    }
}

fn parse_file(file: &Path, syntax: Syntax) -> Result<(String, Tree), Vec<Diagnostic>> {
    let src = fs::read_to_string(file).map_err(|err| {
        vec![Diagnostic::new(
            Code::Io,
            format!("failed to read {}: {}", file.display(), err),
        )]
    })?;

    let language = load_check(LANGUAGE)
        .map_err(|err| vec![Diagnostic::new(Code::Load, err.to_string())])?;
    let mut parser = TemplateParser::new();
    parser
        .set_language(&language)
        .map_err(|err| vec![Diagnostic::new(Code::Load, err.to_string())])?;
    parser.set_syntax(syntax);
    let tree = parser
        .parse(&src)
        .map_err(|err| vec![Diagnostic::new(Code::Load, err.to_string())])?;
    Ok((src, tree))
}

fn file_diagnostics(file: &Path, tree: &Tree) -> Vec<Diagnostic> {
    tree.errors()
        .iter()
        .cloned()
        .map(|d| d.with_source(file.display().to_string()))
        .collect()
}

fn report(diags: &[Diagnostic]) -> i32 {
    for d in diags {
        eprintln!("{d}");
    }
    1
}
