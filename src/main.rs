use std::cell::RefCell;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spoodle::diagnostic::ansi::AnsiRenderer;
use spoodle::diagnostic::{Diagnostic, json, registry};
use spoodle::vm::Step;

#[derive(Parser, Debug)]
#[command(name = "spoodle", version, about = "Compile, run and step through spoodle programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print diagnostics as JSON, one object per line
    #[arg(long, global = true)]
    json: bool,

    /// Never color diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// Log compiler and VM activity to stderr (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile and execute; prints the program's result last
    Run(Input),
    /// Print the bytecode listing
    Disasm(Input),
    /// Print the syntax tree as JSON
    Ast(Input),
    /// Execute one instruction at a time, printing a JSON snapshot per step
    Debug {
        #[command(flatten)]
        input: Input,
        /// Stop after this many steps
        #[arg(long)]
        steps: Option<usize>,
    },
    /// Explain an error code, e.g. SPD-R001
    Explain { code: String },
}

#[derive(Args, Debug)]
struct Input {
    /// Source file
    file: Option<PathBuf>,

    /// Source text given inline
    #[arg(short, long, conflicts_with = "file")]
    eval: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Errors are reported as they happen; `Err(())` only selects the exit code.
fn dispatch(cli: &Cli) -> Result<(), ()> {
    let reporter = Reporter::new(cli);
    match &cli.command {
        Command::Explain { code } => match registry::lookup(&code.to_uppercase()) {
            Some(entry) => {
                print!("{}", entry.long);
                Ok(())
            }
            None => {
                reporter.report(Diagnostic::error(format!("unknown error code '{code}'")));
                Err(())
            }
        },
        Command::Ast(input) => {
            let source = reporter.read(input)?;
            let tree = reporter.parse(&source)?;
            match serde_json::to_string_pretty(&tree) {
                Ok(json) => {
                    println!("{json}");
                    Ok(())
                }
                Err(e) => {
                    reporter.report(Diagnostic::error(format!("cannot serialize syntax tree: {e}")));
                    Err(())
                }
            }
        }
        Command::Disasm(input) => {
            let source = reporter.read(input)?;
            let program = reporter.compile(&source)?;
            let listing = spoodle::disasm::disassemble_program(&program)
                .map_err(|e| reporter.report_error(&spoodle::Error::from(e), None))?;
            print!("{}", listing.text);
            Ok(())
        }
        Command::Run(input) => {
            let source = reporter.read(input)?;
            let program = reporter.compile(&source)?;
            let stdout = Rc::new(RefCell::new(std::io::stdout()));
            let result = spoodle::run(&program, stdout.clone());
            let _ = stdout.borrow_mut().flush();
            match result {
                Ok(value) => {
                    println!("{value}");
                    Ok(())
                }
                Err(e) => {
                    reporter.report_error(&e, None);
                    Err(())
                }
            }
        }
        Command::Debug { input, steps } => {
            let source = reporter.read(input)?;
            let program = reporter.compile(&source)?;
            debug(&program, *steps, &reporter)
        }
    }
}

/// One JSON line per executed instruction. `$emit` output is captured and
/// attached to the step that produced it.
fn debug(program: &spoodle::bytecode::Program, steps: Option<usize>, reporter: &Reporter) -> Result<(), ()> {
    let captured = Rc::new(RefCell::new(Vec::<u8>::new()));
    let mut session =
        spoodle::debug(program, captured.clone()).map_err(|e| reporter.report_error(&e, None))?;
    let limit = steps.unwrap_or(usize::MAX);
    let mut taken = 0;
    while taken < limit {
        let line = session.current_line();
        let origin = (session.context().function(), session.context().ip());
        let step = session.step();
        taken += 1;
        let output = String::from_utf8_lossy(&captured.borrow()).into_owned();
        captured.borrow_mut().clear();
        let record = serde_json::json!({
            "step": taken,
            "line": line,
            "output": output,
            "state": session.snapshot(),
        });
        println!("{record}");
        match step {
            Ok(Step::Continue) => {}
            Ok(Step::Halt(_)) => break,
            Err(e) => {
                reporter.report_error(&e, Some(origin));
                return Err(());
            }
        }
    }
    Ok(())
}

struct Reporter {
    json: bool,
    ansi: AnsiRenderer,
}

impl Reporter {
    fn new(cli: &Cli) -> Self {
        Reporter {
            json: cli.json,
            ansi: AnsiRenderer { use_color: !cli.no_color && std::io::stderr().is_terminal() },
        }
    }

    fn report(&self, d: Diagnostic) {
        if self.json {
            eprintln!("{}", json::render(&d));
        } else {
            eprint!("{}", self.ansi.render(&d));
        }
    }

    fn report_error(&self, e: &spoodle::Error, at: Option<(usize, usize)>) {
        let mut d = Diagnostic::from(e);
        if let Some((function, ip)) = at {
            let function = if function == 0 { "main".to_string() } else { format!("function {function}") };
            d = d.with_note(format!("in {function} at offset {ip:04}"));
        }
        self.report(d);
    }

    fn read(&self, input: &Input) -> Result<String, ()> {
        match (&input.eval, &input.file) {
            (Some(code), _) => Ok(code.clone()),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                self.report(Diagnostic::error(format!("cannot read {}: {e}", path.display())));
            }),
            (None, None) => {
                self.report(Diagnostic::error("no input").with_suggestion("pass a file or -e '<code>'"));
                Err(())
            }
        }
    }

    fn parse(&self, source: &str) -> Result<spoodle::ast::Program, ()> {
        let (tree, diagnostics) = spoodle::parse(source);
        if diagnostics.is_empty() {
            return Ok(tree);
        }
        for d in diagnostics {
            self.report(d.with_source(source));
        }
        Err(())
    }

    fn compile(&self, source: &str) -> Result<spoodle::bytecode::Program, ()> {
        let tree = self.parse(source)?;
        spoodle::compile(&tree).map_err(|e| self.report_error(&e, None))
    }
}
