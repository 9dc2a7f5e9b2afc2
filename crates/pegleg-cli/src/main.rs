use std::{
    env::args,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use pegleg::GrammarError;
use pegleg_gen::{Actions, Matcher, Options};
use pegleg_runtime::{LineColumn, ParseError};

const USAGE: &str = "Usage: pegleg GRAMMAR [--source] [--ast] [--cache] [--track-line-and-column] [--options JSON] [--start RULE] [--input FILE]";

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logger() -> anyhow::Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level)
        .map_err(|_| anyhow::anyhow!("Invalid RUST_LOG level `{level}`"))?;

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {e}"))
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read `{}`", path.display()))
}

fn report_grammar_error(path: &Path, src: &str, e: &GrammarError) -> anyhow::Error {
    let file = path.display();
    match e {
        GrammarError::Syntax(e) => {
            anyhow::anyhow!("{file}:{}:{} {}", e.line, e.column, e.message)
        }
        _ => {
            let pos = LineColumn::at(src, e.offset());
            anyhow::anyhow!("{file}:{}:{} {e}", pos.line, pos.column)
        }
    }
}

fn run() -> anyhow::Result<()> {
    init_logger()?;

    let args = args().skip(1).collect::<Vec<_>>();

    let mut do_source = false;
    let mut do_ast = false;
    let mut options = Options::default();
    let mut cache = false;
    let mut track_line_and_column = false;
    let mut start_rule = None;
    let mut input = None;

    let mut files = Vec::new();
    let mut iter = args.iter().map(String::as_str);

    while let Some(arg) = iter.next() {
        match arg {
            "--source" => do_source = true,
            "--ast" => do_ast = true,
            "--cache" => cache = true,
            "--track-line-and-column" => track_line_and_column = true,
            "--options" => {
                let json = iter.next().context("Expected argument to --options")?;
                options = Options::from_json(json).context("Invalid --options")?;
            }
            "--start" => {
                start_rule = Some(iter.next().context("Expected argument to --start")?);
            }
            "--input" => {
                input = Some(PathBuf::from(
                    iter.next().context("Expected argument to --input")?,
                ));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => files.push(arg),
        }
    }

    options.cache |= cache;
    options.track_line_and_column |= track_line_and_column;

    let path = match files.as_slice() {
        [path] => PathBuf::from(path),
        [] => bail!("No grammar file provided\n{USAGE}"),
        _ => bail!("Only one grammar file may be provided"),
    };

    let src = read_file(&path)?;
    log::debug!("compiling `{}` with {options:?}", path.display());

    let compiled =
        pegleg_gen::compile(&src, &options).map_err(|e| report_grammar_error(&path, &src, &e))?;

    if do_ast {
        compiled.grammar.display(&mut StdoutSink);
        println!();
    }
    if do_source || (!do_ast && input.is_none()) {
        println!("{}", compiled.source);
    }

    let Some(input_path) = input else {
        return Ok(());
    };

    // code blocks cannot run here, they return what their expression matched
    let matcher = Matcher::new(compiled, &Actions::passthrough(), options)?;
    let text = read_file(&input_path)?;

    match matcher.parse(&text, start_rule) {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(ParseError::Syntax(e)) => {
            bail!(
                "{}:{}:{} {}",
                input_path.display(),
                e.line,
                e.column,
                e.message
            )
        }
        Err(e) => Err(e.into()),
    }
}
