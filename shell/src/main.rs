use anyhow::{Context, Result};
use argh::FromArgs;
use linesh::{CandidateSet, CompletionEngine, Interpreter, editor};
use simplelog::{LevelFilter, WriteLogger};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(FromArgs)]
/// Interactive shell with quoting, output redirection, pipes and tab completion.
struct Args {
    #[argh(option, default = "String::from(\"$ \")")]
    /// prompt printed before every line.
    prompt: String,

    #[argh(option)]
    /// append diagnostic logs to this file; nothing is logged otherwise.
    log_file: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// log at debug level instead of info.
    verbose: bool,

    #[argh(switch)]
    /// do not scan PATH for command names and leave Tab unbound.
    no_completion: bool,
}

fn init_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    WriteLogger::init(level, simplelog::Config::default(), file).context("cannot install logger")?;
    Ok(())
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_logging(&args)?;

    let mut interpreter = Interpreter::default();
    let engine = (!args.no_completion).then(|| {
        let candidates = CandidateSet::discover(&interpreter.env().search_path());
        Arc::new(CompletionEngine::new(candidates))
    });

    let rl = editor::build_editor(engine)?;
    interpreter.repl(rl, &args.prompt)?;
    log::info!("session ended");
    Ok(())
}
