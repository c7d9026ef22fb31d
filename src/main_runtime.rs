use std::path::Path;
use tracing_subscriber::EnvFilter;

use transfertool::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},transfertool=debug", config.level)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    let console_layer = if config.json {
        console_layer.json().boxed()
    } else {
        console_layer.boxed()
    };

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so writability is checked first.
    let file_layer = config
        .directory
        .as_deref()
        .filter(|dir| writable(dir))
        .map(|dir| {
            let file_appender = tracing_appender::rolling::daily(dir, "transfertool.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the guard alive for the whole process
            Box::leak(Box::new(guard));

            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, config.directory.as_deref()) {
        eprintln!("Logging to: {}/transfertool.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn writable(dir: &str) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "Warning: Could not create log directory {} ({}), file logging disabled",
            dir, e
        );
        return false;
    }

    let test_path = Path::new(dir).join(".transfertool_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            true
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir, e
            );
            false
        }
    }
}
