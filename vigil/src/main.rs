use clap::ArgMatches;
use slog::{crit, info, o, Drain, Level, Logger};
use std::path::Path;
use std::process;
use std::time::Duration;
use task_executor::TaskExecutor;
use validator_client::{cli_app, Config, ValidatorClient};

fn main() {
    let matches = cli_app()
        .version(env!("CARGO_PKG_VERSION"))
        .get_matches();

    // Configuration problems are fatal before the main loop starts.
    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Unable to start: {error}");
            process::exit(1);
        }
    };

    let log = build_logger(&config.log_level);

    if matches.is_present("dry-run") {
        info!(log, "Configuration is valid");
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            crit!(log, "Unable to start tokio runtime"; "error" => %error);
            process::exit(1);
        }
    };

    let (shutdown, exit) = task_executor::signal();
    let executor = TaskExecutor::new(runtime.handle().clone(), exit, log.clone());

    let result: Result<(), String> = runtime.block_on(async {
        let client = ValidatorClient::from_config(config, executor).await?;
        info!(log, "Validator client started");

        tokio::select! {
            _ = client.run() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(log, "Shutting down");
            }
        }
        Ok(())
    });

    drop(shutdown);
    runtime.shutdown_timeout(Duration::from_secs(2));

    if let Err(error) = result {
        crit!(log, "Validator client failed"; "error" => %error);
        drop(log);
        process::exit(1);
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config, String> {
    let path = matches
        .value_of("config")
        .ok_or_else(|| "--config is required".to_string())?;
    let mut config = Config::from_file(Path::new(path))?;

    if let Some(level) = matches.value_of("log-level") {
        config.log_level = level.to_string();
    }
    if let Some(graffiti) = matches.value_of("graffiti") {
        config.graffiti = Some(graffiti.to_string());
    }
    config.validate()?;
    Ok(config)
}

fn build_logger(level: &str) -> Logger {
    let level = match level {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).chan_size(4096).build().fuse();
    let drain = drain.filter_level(level).fuse();
    Logger::root(drain, o!())
}
