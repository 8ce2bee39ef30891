use anyhow::Context;
use argh::FromArgs;
use kidshell::Shell;
use kidshell::config::{self, Settings};
use kidshell::display::TerminalDisplay;
use kidshell::eval::Evaluator;
use kidshell::handlers::standard_table;
use kidshell::path::SandboxRoot;
use kidshell::session::Session;
use kidshell::store::FileConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A friendly math and learning shell for kids.
struct Cli {
    #[argh(option)]
    /// folder for settings and data (default: $KIDSHELL_HOME, then ~/.kidshell)
    home: Option<PathBuf>,

    #[argh(switch)]
    /// start fresh instead of restoring the last session
    new: bool,

    #[argh(option)]
    /// log filter such as "debug" (default: $RUST_LOG, then "warn")
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli: Cli = argh::from_env();
    init_tracing(cli.log.as_deref());

    let home = config::home_dir(cli.home)?;
    let settings = Settings::load(&home)?;
    let data_dir = settings.data_dir(&home);
    let root = SandboxRoot::create(&data_dir)
        .with_context(|| format!("can't use {} as the data folder", data_dir.display()))?;
    let store = FileConfigStore::open(&root)?;

    let session = Session::new(root, Box::new(store))
        .with_evaluator(Evaluator::with_max_len(settings.max_expression_len))
        .with_editor(settings.editor()?);

    let table = Arc::new(standard_table()?);
    info!(home = %home.display(), routes = table.route_names().len(), "kidshell starting");

    let mut display = TerminalDisplay::stdout();
    let mut shell = Shell::new(table, session).with_max_line_len(settings.max_line_len);
    shell.start(settings.restore_session && !cli.new, &mut display)?;
    shell.repl(&mut display)
}
