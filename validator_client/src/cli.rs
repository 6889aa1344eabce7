use clap::{App, Arg};

pub fn cli_app<'a, 'b>() -> App<'a, 'b> {
    App::new("vigil")
        .about(
            "A multi-beacon-node validator client: performs attestation, block \
            proposal and sync-committee duties against a pool of beacon nodes \
            and builder relays.",
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .value_name("FILE")
                .help("Path to the YAML configuration file.")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Overrides the configured log level.")
                .possible_values(&["trace", "debug", "info", "warn", "error"])
                .takes_value(true),
        )
        .arg(
            Arg::with_name("graffiti")
                .long("graffiti")
                .value_name("GRAFFITI")
                .help("Overrides the configured block graffiti (up to 32 bytes).")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dry-run")
                .long("dry-run")
                .help("Validate the configuration and exit."),
        )
}
