use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "articlelink_lib=debug,articlelink_cli=debug,warn"
    } else {
        "articlelink_lib=warn,articlelink_cli=info,warn"
    }
}

/// Install the process-wide subscriber. Logs go to stderr so stdout stays
/// clean for command output; `RUST_LOG` overrides the default filter.
/// Returns false when a subscriber was already installed.
pub fn init(verbose: bool, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if json {
        tracing_subscriber::registry().with(filter).with(layer.json()).try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(layer.compact()).try_init()
    };
    installed.is_ok()
}
