mod app;
mod library;
mod system;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use ratatui::DefaultTerminal;
use snipfill::{FieldValue, ValueBindings};
use tracing_subscriber::EnvFilter;

use crate::app::App;

const LOG_ENV: &str = "SNIPFILL_LOG";

#[derive(Debug, Parser)]
#[command(name = "snipfill", version, about = "Fill in and render snippet templates")]
struct Cli {
    /// Snippet library used by the interactive runner
    #[arg(long, env = "SNIPFILL_LIBRARY", global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the fields and formulas of a template as JSON
    Scan {
        /// Template file, or `-` for stdin
        file: PathBuf,
    },
    /// Render a template, starting from the defaults it declares
    Render {
        /// Template file, or `-` for stdin
        file: PathBuf,
        /// JSON object of field values, e.g. {"qty": "3", "gift": true}
        #[arg(long)]
        values: Option<PathBuf>,
        /// Single field value as name=value; `true`/`false` set toggles
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
        set: Vec<(String, FieldValue)>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Scan { file }) => {
            init_stderr_logging();
            let text = read_template(&file)?;
            let result = snipfill::scan(&text);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Command::Render { file, values, set }) => {
            init_stderr_logging();
            let text = read_template(&file)?;
            let mut bindings = snipfill::scan(&text).initial_bindings();
            if let Some(path) = values {
                bindings.extend(read_bindings(&path)?);
            }
            bindings.extend(set);
            print!("{}", snipfill::render(&text, &bindings));
        }
        None => run_interactive(cli.library)?,
    }
    Ok(())
}

fn run_interactive(library: Option<PathBuf>) -> Result<()> {
    let library_path = system::library_path(library)?;
    init_file_logging(&system::log_path(&library_path))?;

    let terminal = ratatui::init();
    execute!(io::stdout(), EnableMouseCapture)?;

    let app = App::load(library_path);
    let result = run_app(terminal, app);

    execute!(io::stdout(), DisableMouseCapture)?;
    ratatui::restore();
    result
}

fn run_app(mut terminal: DefaultTerminal, mut app: App) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    loop {
        if app.needs_redraw {
            terminal.clear()?;
            app.needs_redraw = false;
        }
        terminal.draw(|frame| ui::render_app(frame, &mut app))?;

        if app.should_quit {
            break;
        }

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                _ => {}
            }
        }
    }
    Ok(())
}

fn read_template(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        return io::read_to_string(io::stdin()).context("failed to read template from stdin");
    }
    Ok(system::read_file(file)?)
}

fn read_bindings(path: &Path) -> Result<ValueBindings> {
    let content = system::read_file(path)?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object of field values", path.display()))
}

fn parse_binding(input: &str) -> Result<(String, FieldValue), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{input}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in `{input}`"));
    }
    let value = match value {
        "true" => FieldValue::Flag(true),
        "false" => FieldValue::Flag(false),
        text => FieldValue::from(text),
    };
    Ok((name.to_string(), value))
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();
}

/// The runner owns the terminal, so logs go to a file, and only when
/// `SNIPFILL_LOG` asks for them.
fn init_file_logging(path: &Path) -> Result<()> {
    if std::env::var_os(LOG_ENV).is_none() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
