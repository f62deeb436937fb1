use std::io;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs the stdout and rolling-file subscribers.
///
/// `verbose` lowers the linker target to debug so unmatchable organization
/// names show up on stdout.
pub fn configure_logging(verbose: bool) {
    // reqwest connection pool chatter is never useful at warn
    let custom_filter = FilterFn::new(|metadata| {
        !(metadata.level() == &Level::WARN && metadata.target().starts_with("hyper_util"))
    });

    let stdout_directives = if verbose {
        "info,linker=debug,catalog=info,history=info,web_request=warn,db_query=warn,sqlx=off"
    } else {
        "info,linker=info,catalog=info,history=info,web_request=warn,db_query=warn,sqlx=off"
    };

    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(EnvFilter::new(stdout_directives))
        .with_filter(custom_filter);

    let file_appender = rolling::daily("logs", "reconcile.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(
            "info,catalog=debug,linker=debug,history=debug,sqlx=info",
        ));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
