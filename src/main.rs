use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};

use ember_script::ast::printer;
use ember_script::error::{CompileError, RuntimeError};
use ember_script::interpreter::Interpreter;
use ember_script::lexer;
use ember_script::parser::Parser as EmberParser;
use ember_script::vm::chunk::{self, Chunk};
use ember_script::vm::vm::Vm;

#[derive(Parser, Debug)]
#[command(
    name = "ember",
    about = "The EmberScript interpreter and bytecode compiler"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// EmberScript source file to run (a .embc file runs on the VM directly)
    file: Option<PathBuf>,

    /// Run on the tree-walking evaluator instead of the bytecode VM
    #[arg(long)]
    evaluate: bool,

    /// Dump tokens and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Dump AST and exit
    #[arg(long)]
    dump_ast: bool,

    /// AST output format
    #[arg(long, default_value = "sexp", value_parser = ["sexp", "json"])]
    ast_format: String,

    /// Disassemble bytecode (from source or a chunk file) and print
    #[arg(long)]
    disassemble: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script to a bytecode chunk file
    Compile {
        /// EmberScript source file
        file: PathBuf,

        /// Output path; no extension (or `.exe`) emits a native executable
        #[arg(short = 'o', default_value = "a.embc")]
        output: PathBuf,
    },
    /// Run a compiled chunk file
    Run {
        /// Chunk file produced by `compile`
        file: PathBuf,
    },
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("read source file '{}'", path.display()))
}

fn is_chunk_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "embc")
}

fn parse_source(
    source: &str,
    filename: &str,
) -> Result<ember_script::ast::Program> {
    let tokens = lexer::tokenize(source)
        .map_err(|errors| report_compile_errors(errors, filename, source))?;
    EmberParser::new(tokens)
        .parse()
        .map_err(|errors| report_compile_errors(errors, filename, source))
}

fn compile_source(source: &str, path: &Path) -> Result<Chunk> {
    let filename = path.display().to_string();
    let program = parse_source(source, &filename)?;
    let base_dir = path.parent().map(PathBuf::from).unwrap_or_default();
    ember_script::vm::compiler::Compiler::with_base_dir(base_dir)
        .compile(&program)
        .map_err(|e| report_compile_errors(vec![e], &filename, source))
}

fn load_chunk(path: &Path) -> Result<Chunk> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read chunk from '{}'", path.display()))?;
    Chunk::read_from(&mut bytes.as_slice())
        .with_context(|| format!("'{}' is not a valid chunk file", path.display()))
}

fn save_chunk(compiled: &Chunk, path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    compiled
        .write_to(&mut bytes)
        .context("serialize bytecode")?;
    std::fs::write(path, bytes).with_context(|| format!("write chunk to '{}'", path.display()))
}

fn report_compile_errors(
    errors: Vec<CompileError>,
    filename: &str,
    source: &str,
) -> anyhow::Error {
    let count = errors.len();
    for error in errors {
        let error_with_src = error.with_source_code(filename, source);
        eprintln!("{:?}", miette::Report::new(error_with_src));
    }
    anyhow::anyhow!("{} compile error(s)", count)
}

fn report_runtime_error(error: &RuntimeError, source: Option<&str>) -> anyhow::Error {
    match source {
        Some(src) => eprintln!("{}", error.display_with_line(src)),
        None => eprintln!("Error: {error}"),
    }
    anyhow::anyhow!("execution failed")
}

fn run_chunk(compiled: Chunk, source: Option<&str>) -> Result<()> {
    let mut vm = Vm::new();
    vm.interpret(compiled)
        .map_err(|e| report_runtime_error(&e, source))?;
    Ok(())
}

/// The embed path triggers when the output has no extension or `.exe`.
fn wants_native_executable(output: &Path) -> bool {
    match output.extension() {
        None => true,
        Some(ext) => ext == "exe",
    }
}

fn compile_command(file: &Path, output: &Path) -> Result<()> {
    let source = read_source(file)?;
    let compiled = compile_source(&source, file)?;
    if wants_native_executable(output) {
        let artifact = ember_script::embed::emit_executable(&compiled, output)?;
        println!("Wrote {}", artifact.display());
    } else {
        save_chunk(&compiled, output)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Compile { ref file, ref output }) => {
            return compile_command(file, output);
        }
        Some(Command::Run { ref file }) => {
            let compiled = load_chunk(file)?;
            return run_chunk(compiled, None);
        }
        None => {}
    }

    let Some(ref path) = cli.file else {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        eprintln!();
        bail!("source file required");
    };
    if !path.exists() {
        bail!("file not found: '{}'", path.display());
    }

    if cli.dump_tokens {
        let source = read_source(path)?;
        let filename = path.display().to_string();
        let tokens = lexer::tokenize(&source)
            .map_err(|e| report_compile_errors(e, &filename, &source))?;
        for token in &tokens {
            println!("{token}");
        }
        return Ok(());
    }

    if cli.dump_ast {
        let source = read_source(path)?;
        let filename = path.display().to_string();
        let program = parse_source(&source, &filename)?;
        if cli.ast_format.as_str() == "json" {
            print!("{}", printer::to_json(&program));
        } else {
            print!("{}", printer::to_sexp(&program));
        }
        return Ok(());
    }

    if cli.disassemble {
        let name = path.display().to_string();
        let compiled = if is_chunk_file(path) {
            load_chunk(path)?
        } else {
            let source = read_source(path)?;
            compile_source(&source, path)?
        };
        print!("{}", chunk::disassemble(&compiled, &name));
        return Ok(());
    }

    if is_chunk_file(path) {
        let compiled = load_chunk(path)?;
        return run_chunk(compiled, None);
    }

    let source = read_source(path)?;
    if cli.evaluate {
        let filename = path.display().to_string();
        let program = parse_source(&source, &filename)?;
        let mut interpreter = Interpreter::new();
        interpreter
            .interpret(&program)
            .map_err(|e| report_runtime_error(&e, Some(&source)))?;
        Ok(())
    } else {
        let compiled = compile_source(&source, path)?;
        run_chunk(compiled, Some(&source))
    }
}
