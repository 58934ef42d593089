use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use rox::ast_printer::AstPrinter;
use rox::config::{InterpreterConfig, DEFAULT_MAX_CALL_DEPTH};
use rox::interpreter::Interpreter;
use rox::parser::parse_program;
use rox::reporter::ConsoleReporter;
use rox::scanner::{scan_tokens, Scanner};
use rox::session::{RunStatus, Session};
use rox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Tree-walking interpreter for the Lox language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to rox.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print the token list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parses a program and prints its syntax tree
    Parse { filename: PathBuf },

    /// Runs a program from a file
    Run {
        filename: PathBuf,

        /// Maximum call depth before a call fails
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_depth: usize,
    },

    /// Starts an interactive prompt
    Repl {
        /// Maximum call depth before a call fails
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_depth: usize,
    },
}

/// Reads the contents of a file into a String
fn read_file(filename: &PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    String::from_utf8(buf).context(format!("File {:?} is not valid UTF-8", filename))
}

fn init_logger() -> Result<()> {
    let log_file = File::create("rox.log").context("Failed to create rox.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'rox::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "{} [{}:{}] - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to rox.log");
    Ok(())
}

fn run_file(filename: PathBuf, max_depth: usize) -> Result<RunStatus> {
    let source = read_file(&filename)?;
    let config = InterpreterConfig::default().with_max_call_depth(max_depth);

    let mut session = Session::new(Interpreter::with_config(config));
    Ok(session.run_source(&source))
}

fn repl(max_depth: usize) -> Result<RunStatus> {
    let config = InterpreterConfig::default().with_max_call_depth(max_depth);
    let mut session = Session::new(Interpreter::with_config(config));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        let line = match lines.next() {
            Some(line) => line.context("Failed to read from stdin")?,
            None => break,
        };

        let status = session.run_line(&line);
        debug!("REPL line finished with {:?}", status);
    }

    println!();
    Ok(RunStatus::Ok)
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let status = match args.commands {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");
            let source = read_file(&filename)?;

            if json {
                let (tokens, errors) = scan_tokens(&source, &mut ConsoleReporter);
                println!("{}", serde_json::to_string_pretty(&tokens)?);

                if errors > 0 {
                    RunStatus::StaticError
                } else {
                    RunStatus::Ok
                }
            } else {
                let mut tokenized = true;

                for token in Scanner::new(&source) {
                    match token {
                        Ok(token) => println!("{}", token),
                        Err(e) => {
                            tokenized = false;
                            debug!("Tokenization debug: {}", e);
                            eprintln!("{}", e);
                        }
                    }
                }

                if tokenized {
                    RunStatus::Ok
                } else {
                    RunStatus::StaticError
                }
            }
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let source = read_file(&filename)?;

            let (tokens, lex_errors): (Vec<Token>, usize) = scan_tokens(&source, &mut ConsoleReporter);
            let (statements, parse_errors) = parse_program(&tokens, &mut ConsoleReporter);

            print!("{}", AstPrinter::print_program(&statements));

            if lex_errors + parse_errors > 0 {
                RunStatus::StaticError
            } else {
                RunStatus::Ok
            }
        }

        Commands::Run {
            filename,
            max_depth,
        } => {
            info!("Running Run subcommand");
            run_file(filename, max_depth)?
        }

        Commands::Repl { max_depth } => {
            info!("Running Repl subcommand");
            repl(max_depth)?
        }
    };

    info!("Finished with {:?}", status);

    if status != RunStatus::Ok {
        std::process::exit(status.exit_code());
    }

    Ok(())
}
