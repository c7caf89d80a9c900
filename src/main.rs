// mapscope: std::map data formatters over a recorded debuggee

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mapscope::config::{
    FormatterConfig, SessionConfig, DEFAULT_MAX_CHILDREN, DEFAULT_MAX_TREE_HEIGHT,
    DEFAULT_SNAPSHOT_MEMORY_LIMIT,
};
use mapscope::debuggee::StdLib;
use mapscope::session::{Session, SessionError};
use mapscope::ui::App;

/// Browse std::map values of a recorded C++ program
#[derive(Debug, clap::Parser)]
#[command(version, about)]
struct Args {
    /// Standard library layout: libcxx, libcxx-legacy, libstdcxx, libstdcxx-debug, msvc
    #[arg(long, default_value = "libstdcxx")]
    library: StdLib,

    /// Children rendered per container before eliding
    #[arg(long, default_value_t = DEFAULT_MAX_CHILDREN)]
    max_children: usize,

    /// Links followed in one descent or climb before a tree is called corrupt
    #[arg(long, default_value_t = DEFAULT_MAX_TREE_HEIGHT)]
    max_tree_height: usize,

    /// Snapshot history budget in bytes
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_MEMORY_LIMIT)]
    snapshot_limit: usize,

    /// Print `frame variable` at every stop instead of starting the TUI
    #[arg(long)]
    dump: bool,

    /// Write logs here (RUST_LOG selects the level)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.library).with_formatter(FormatterConfig {
            max_children: self.max_children,
            max_tree_height: self.max_tree_height,
        });
        config.snapshot_memory_limit = self.snapshot_limit;
        config
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()?;
        }
        // The TUI owns the terminal; only log to stderr in dump mode
        None if args.dump => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()?,
        None => registry.try_init()?,
    }
    Ok(())
}

fn dump(session: &mut Session) -> anyhow::Result<()> {
    loop {
        println!(
            "* stop {}/{} at line {}",
            session.stop_index() + 1,
            session.total_stops(),
            session.stop_line()
        );
        println!("{}", session.frame_variables()?);
        match session.continue_to_breakpoint() {
            Ok(_) => {}
            Err(SessionError::ProcessExited) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut session = Session::launch(args.session_config())
        .with_context(|| format!("recording the sample program for {}", args.library))?;

    if args.dump {
        return dump(&mut session);
    }

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session);
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.context("running the terminal UI")
}
