//! abc-drv - Driver for the ABC toolchain.
//!
//! Orchestrates the pipeline (source → tokens → AST → bytecode →
//! image / VM) behind the `abc` binary:
//!
//! ```text
//! abc compile <src> [<out>]   compile .bas to a .abc image
//! abc vm <image>              execute a compiled image
//! abc disasm <image> [<out>]  textual listing (stdout by default)
//! abc asm <listing> <image>   assemble a listing back to an image
//! abc tokenize <src>          dump the token stream
//! ```
//!
//! Diagnostics from the parser go to stderr in source order; if any
//! errors were reported, code generation is skipped and the process
//! exits non-zero.

pub mod asm;
pub mod disasm;
mod listing;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use abc_byt::CompiledProgram;
use abc_lex::{token_name, Lexer, TokenKind};
use abc_par::Parser;
use abc_util::Handler;
use abc_vm::Vm;

/// Compile and run classic line-numbered BASIC.
#[derive(ClapParser, Debug)]
#[command(name = "abc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and run classic line-numbered BASIC", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "ABC_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a BASIC source file to a bytecode image
    ///
    /// The default output path replaces the source extension with
    /// `.abc`.
    Compile {
        source: PathBuf,
        output: Option<PathBuf>,
    },

    /// Execute a compiled bytecode image
    Vm { image: PathBuf },

    /// Disassemble an image to a textual listing
    Disasm {
        image: PathBuf,
        output: Option<PathBuf>,
    },

    /// Assemble a textual listing back into an image
    Asm {
        listing: PathBuf,
        image: PathBuf,
    },

    /// Dump the token stream of a source file
    Tokenize { source: PathBuf },
}

/// CLI entry point; `main` only reports the error.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Compile { source, output } => cmd_compile(&source, output),
        Commands::Vm { image } => cmd_vm(&image),
        Commands::Disasm { image, output } => cmd_disasm(&image, output),
        Commands::Asm { listing, image } => cmd_asm(&listing, &image),
        Commands::Tokenize { source } => cmd_tokenize(&source),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
    Ok(())
}

/// Run the compile half of the pipeline over source text.
///
/// Parser diagnostics render to stderr; any error skips code
/// generation.
pub fn compile_source(text: &str) -> Result<CompiledProgram> {
    let handler = Handler::new();
    let ast = {
        let mut parser = Parser::new(text, &handler);
        parser.parse_program()
    };
    debug!(statements = ast.children.len(), "parsed program");

    handler.render_all(&mut std::io::stderr())?;
    let errors = handler.error_count();
    if errors > 0 {
        bail!(
            "Compilation failed with {errors} error{}",
            if errors == 1 { "" } else { "s" }
        );
    }

    let program = abc_gen::compile(&ast)?;
    debug!(
        instructions = program.code.len(),
        constants = program.const_pool.len(),
        "generated bytecode"
    );
    Ok(program)
}

fn default_output(source: &Path) -> PathBuf {
    source.with_extension("abc")
}

fn cmd_compile(source: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(source));
    let text = fs::read_to_string(source)
        .with_context(|| format!("cannot open file '{}'", source.display()))?;

    let program = compile_source(&text)?;

    println!("Compiling {} -> {}", source.display(), output.display());
    println!("  {} instructions", program.code.len());
    println!("  {} constants", program.const_pool.len());
    println!("  {} strings", program.string_pool.len());
    println!("  {} variables", program.var_table.len());
    println!("  {} lines", program.line_map.len());

    abc_img::write_file(&output, &program)
        .with_context(|| format!("cannot write image '{}'", output.display()))?;

    println!("Success!");
    Ok(())
}

fn cmd_vm(image: &Path) -> Result<()> {
    let program = abc_img::read_file(image)
        .with_context(|| format!("cannot load image '{}'", image.display()))?;
    let mut vm = Vm::new(&program);
    vm.run();
    Ok(())
}

fn cmd_disasm(image: &Path, output: Option<PathBuf>) -> Result<()> {
    let program = abc_img::read_file(image)
        .with_context(|| format!("cannot load image '{}'", image.display()))?;
    match output {
        Some(path) => {
            let mut file = fs::File::create(&path)
                .with_context(|| format!("cannot create '{}'", path.display()))?;
            disasm::disassemble(&program, &mut file)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            disasm::disassemble(&program, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn cmd_asm(listing: &Path, image: &Path) -> Result<()> {
    let text = fs::read_to_string(listing)
        .with_context(|| format!("cannot open file '{}'", listing.display()))?;
    let program = asm::assemble(&text)?;
    abc_img::write_file(image, &program)
        .with_context(|| format!("cannot write image '{}'", image.display()))?;
    println!("Assembled {} -> {}", listing.display(), image.display());
    Ok(())
}

fn cmd_tokenize(source: &Path) -> Result<()> {
    let text = fs::read_to_string(source)
        .with_context(|| format!("cannot open file '{}'", source.display()))?;

    let mut lexer = Lexer::new(&text);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let token = lexer.bump();
        write!(out, "{}  {}", token.span, token_name(token.kind))?;
        match token.kind {
            TokenKind::Number => write!(out, "  {}", token.value)?,
            TokenKind::Ident | TokenKind::String | TokenKind::Rem => {
                write!(out, "  {:?}", token.text())?
            }
            _ => {}
        }
        writeln!(out)?;
        if token.kind == TokenKind::Eof {
            break;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_compile() {
        let cli = Cli::parse_from(["abc", "compile", "game.bas"]);
        match cli.command {
            Commands::Compile { source, output } => {
                assert_eq!(source, PathBuf::from("game.bas"));
                assert!(output.is_none());
            }
            _ => panic!("expected compile command"),
        }
    }

    #[test]
    fn test_cli_parse_compile_with_output() {
        let cli = Cli::parse_from(["abc", "compile", "game.bas", "out.abc"]);
        match cli.command {
            Commands::Compile { output, .. } => {
                assert_eq!(output, Some(PathBuf::from("out.abc")));
            }
            _ => panic!("expected compile command"),
        }
    }

    #[test]
    fn test_cli_parse_vm() {
        let cli = Cli::parse_from(["abc", "vm", "game.abc"]);
        assert!(matches!(cli.command, Commands::Vm { .. }));
    }

    #[test]
    fn test_cli_parse_global_verbose() {
        let cli = Cli::parse_from(["abc", "--verbose", "tokenize", "game.bas"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_default_output_replaces_extension() {
        assert_eq!(
            default_output(Path::new("prog.bas")),
            PathBuf::from("prog.abc")
        );
        assert_eq!(default_output(Path::new("prog")), PathBuf::from("prog.abc"));
    }

    #[test]
    fn test_compile_source_reports_error_count() {
        let err = compile_source("10 FROB\n20 GLORP\n").unwrap_err();
        assert!(err.to_string().contains("2 errors"));
    }

    #[test]
    fn test_compile_source_produces_program() {
        let program = compile_source("10 PRINT \"OK\"\n").unwrap();
        assert_eq!(program.line_map.len(), 1);
        assert!(!program.code.is_empty());
    }
}
