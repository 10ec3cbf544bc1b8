use tracing_subscriber::EnvFilter;

fn default_directives(debug: bool) -> &'static str {
    if debug {
        "info,mediafetch=debug,tower_http=debug"
    } else {
        "info"
    }
}

/// Installs the global fmt subscriber on stderr. `RUST_LOG` wins over the
/// `debug` flag when set.
pub fn init_logging(debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}
