use crate::cli::Ui;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "perpx_load=info,perpx_load_runtime=info";

/// Installs the global subscriber, writing to stderr. The live display owns the screen, so only
/// errors get through while it runs.
pub fn init_logging(ui: Ui) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(ui, env.as_deref()))
        .with_writer(std::io::stderr)
        .try_init();
}

fn filter_for(ui: Ui, env: Option<&str>) -> EnvFilter {
    match ui {
        Ui::Tui => EnvFilter::new("error"),
        Ui::Plain => env
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}
