use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tarn_core::{IntKind, RealKind, RuntimeValue, Type};

#[derive(Parser)]
#[command(name = "tarn")]
#[command(about = "Tarn - a small statically typed language JIT-compiled through Cranelift")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and execute it in process
    Run {
        input: PathBuf,

        /// Function to execute instead of `main`
        #[arg(long, default_value = "main")]
        entry: String,

        /// Argument passed to the entry function
        #[arg(long)]
        arg: Option<String>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse a source file and dump its AST as JSON
    Ast {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile a source file and print the generated Cranelift IR
    Ir {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            entry,
            arg,
            verbose,
        } => cmd_run(input, entry, arg, verbose),
        Commands::Ast { input, output } => cmd_ast(input, output),
        Commands::Ir { input, output } => cmd_ir(input, output),
    }
}

/// `CompileError` carries `Rc`-based types, so it cannot travel as an
/// `anyhow` cause; it is rendered at the boundary instead.
fn compile_err(err: tarn_core::CompileError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}

fn cmd_run(input: PathBuf, entry: String, arg: Option<String>, verbose: bool) -> Result<()> {
    use colored::*;
    use std::fs;
    use std::time::Instant;
    use tarn_core::{Engine, ModuleCompiler};

    if verbose {
        println!("{}", "Tarn JIT".bright_blue().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!("Input: {}", input.display());
        if entry != "main" {
            println!("Entry: {entry}");
        }
        println!();
    }

    let start = Instant::now();

    let source = fs::read_to_string(&input)
        .with_context(|| format!("cannot read {}", input.display()))?;

    if verbose {
        println!("Parsing...");
    }
    let program = tarn_syntax::parse_program(&source)?;

    if verbose {
        println!("Compiling...");
    }
    let compiled = ModuleCompiler::new()
        .map_err(compile_err)?
        .compile(&program)
        .map_err(compile_err)?;
    let engine = Engine::new(compiled).map_err(compile_err)?;

    if verbose {
        println!("Running {entry}...");
        println!();
    }

    let function = engine.find_function(&entry).map_err(compile_err)?;
    let return_type = function.signature().return_type.clone();
    let result = match arg {
        Some(text) => {
            let params = &function.signature().params;
            let [param] = params.as_slice() else {
                anyhow::bail!("`{entry}` takes {} argument(s), 1 given", params.len());
            };
            let value = parse_argument(&text, param)?;
            engine.run_with(&function, value).map_err(compile_err)?
        }
        None => engine.run(&function).map_err(compile_err)?,
    };

    if verbose {
        let elapsed = start.elapsed();
        println!(
            "{} Finished in {:.3}s",
            "SUCCESS:".bright_green().bold(),
            elapsed.as_secs_f64()
        );
    }

    if !matches!(return_type, Type::Unit) {
        println!("{}", result.display_as(&return_type));
    }

    Ok(())
}

fn cmd_ast(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    use std::fs;

    let source = fs::read_to_string(&input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let program = tarn_syntax::parse_program(&source)?;
    let json = serde_json::to_string_pretty(&program)?;

    match output {
        Some(path) => fs::write(&path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

fn cmd_ir(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    use colored::*;
    use std::fs;
    use tarn_core::ModuleCompiler;

    let source = fs::read_to_string(&input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let program = tarn_syntax::parse_program(&source)?;
    let compiled = ModuleCompiler::new()
        .map_err(compile_err)?
        .compile(&program)
        .map_err(compile_err)?;

    match output {
        Some(path) => {
            let mut text = String::new();
            for (name, clif) in compiled.display_ir() {
                text.push_str(&format!("; function {name}\n{clif}\n"));
            }
            fs::write(&path, text)?;
        }
        None => {
            for (name, clif) in compiled.display_ir() {
                println!("{}", format!("; function {name}").bright_green().bold());
                println!("{clif}");
            }
        }
    }

    Ok(())
}

/// Parses a command-line argument string as the entry function's declared
/// parameter type. Unsigned values are re-expressed in the signed carrier
/// the JIT boundary uses.
fn parse_argument(text: &str, ty: &Type) -> Result<RuntimeValue> {
    let bad = || anyhow::anyhow!("`{text}` is not a valid `{ty}` argument");
    let value = match ty {
        Type::Bool => match text {
            "true" => RuntimeValue::I8(1),
            "false" => RuntimeValue::I8(0),
            _ => return Err(bad()),
        },
        Type::Int(IntKind::Char) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if u32::from(c) <= u32::from(u16::MAX) => {
                    RuntimeValue::I16(c as u16 as i16)
                }
                _ => return Err(bad()),
            }
        }
        Type::Int(kind) => match (kind.is_signed(), kind.bits()) {
            (true, 8) => RuntimeValue::I8(text.parse().map_err(|_| bad())?),
            (true, 16) => RuntimeValue::I16(text.parse().map_err(|_| bad())?),
            (true, 32) => RuntimeValue::I32(text.parse().map_err(|_| bad())?),
            (true, _) => RuntimeValue::I64(text.parse().map_err(|_| bad())?),
            (false, 8) => RuntimeValue::I8(text.parse::<u8>().map_err(|_| bad())? as i8),
            (false, 16) => RuntimeValue::I16(text.parse::<u16>().map_err(|_| bad())? as i16),
            (false, 32) => RuntimeValue::I32(text.parse::<u32>().map_err(|_| bad())? as i32),
            (false, _) => RuntimeValue::I64(text.parse::<u64>().map_err(|_| bad())? as i64),
        },
        Type::Real(RealKind::Float) => RuntimeValue::F32(text.parse().map_err(|_| bad())?),
        Type::Real(RealKind::Double) => RuntimeValue::F64(text.parse().map_err(|_| bad())?),
        _ => return Err(bad()),
    };
    Ok(value)
}
