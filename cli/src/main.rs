#![deny(clippy::all)]

use anyhow::Context;
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;

/// The sub-command to execute.
#[derive(Debug, StructOpt)]
enum Command {
    /// Parse a source file and print its AST.
    #[structopt(name = "parse")]
    Parse {
        /// Path to the source code file
        #[structopt(parse(from_os_str))]
        source_path: PathBuf,
        /// Print the AST as JSON instead of the debug form
        #[structopt(long = "json")]
        json: bool,
    },

    /// Parse a standalone expression and print its AST.
    #[structopt(name = "expr")]
    Expr {
        /// The expression text
        expression: String,
        /// Print the AST as JSON instead of the debug form
        #[structopt(long = "json")]
        json: bool,
    },

    /// Parse a standalone type annotation and print its AST.
    #[structopt(name = "type")]
    Type {
        /// The type text
        type_text: String,
    },
}

/// Tomo executable, for parsing and inspecting Tomo programs
#[derive(Debug, StructOpt)]
#[structopt(name = "tomo")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

fn run(opt: Opt) -> anyhow::Result<()> {
    match opt.cmd {
        Command::Parse { source_path, json } => {
            let path = source_path.display().to_string();
            let ast = tomo::parse_file(&path)
                .map_err(|err| anyhow::anyhow!("{err:#}"))
                .with_context(|| format!("Failed to parse {path}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(ast.as_ref())?);
            } else {
                println!("{ast:#?}");
            }
        }

        Command::Expr { expression, json } => {
            let ast = tomo::parse_expression_str(&expression)
                .map_err(|err| anyhow::anyhow!("{err:#}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(ast.as_ref())?);
            } else {
                println!("{ast:#?}");
            }
        }

        Command::Type { type_text } => {
            let ty = tomo::parse_type_str(&type_text)
                .map_err(|err| anyhow::anyhow!("{err:#}"))?;
            println!("{ty:#?}");
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{err:#}");
            1
        }
    };
    process::exit(exit_code);
}
