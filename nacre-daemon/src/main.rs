//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{App, Arg};
use nacre_daemon::core::dispatch::PermitAll;
use nacre_daemon::core::{Context, Core};
use nacre_daemon::config::{Config, LogDestination};
use nacre_daemon::{config, core, listener};
use nacre_datastore::registry::{DatastoreRegistry, Store, XmlFileStore};
use nacre_datastore::validate::AlwaysTrue;
use nacre_yang::{NullLoader, SchemaContext, SchemaLoader};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

const EXIT_FATAL: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn init_tracing(config: &Config, foreground: bool) {
    let level = match config.debug_level {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // In the foreground, syslog output falls back to stderr like the rest
    // of the startup diagnostics.
    let destination = match (&config.log_destination, foreground) {
        (LogDestination::Syslog, true) => &LogDestination::Stderr,
        (destination, _) => destination,
    };

    let journald = matches!(destination, LogDestination::Syslog)
        .then(|| tracing_journald::layer().ok())
        .flatten();
    let stderr = matches!(destination, LogDestination::Stderr).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    });
    let stdout = matches!(destination, LogDestination::Stdout).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .boxed()
    });
    let file = match destination {
        LogDestination::File(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_default();
            let appender = rolling::never(dir, name);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_target(false)
                    .with_ansi(false)
                    .boxed(),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(journald)
        .with(stderr)
        .with(stdout)
        .with(file)
        .init();
}

fn read_pidfile(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i32>().ok())
}

fn pid_alive(pid: i32) -> bool {
    nix::sys::signal::kill(Pid::from_raw(pid), None).is_ok()
}

// Terminates a previously running daemon via its pid file and removes the
// stale socket.
fn zap(config: &Config) {
    if let Some(pid) = read_pidfile(&config.pid_file)
        && pid_alive(pid)
    {
        eprintln!("terminating daemon with pid {pid}");
        let _ = nix::sys::signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
    let _ = std::fs::remove_file(&config.pid_file);
    if config.socket_family == config::SocketFamily::Unix {
        let _ = std::fs::remove_file(&config.socket_address);
    }
}

fn write_pidfile(path: &Path) -> std::io::Result<()> {
    let pid = nix::unistd::getpid();
    std::fs::write(path, format!("{pid}\n"))
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let app = App::new("Nacre configuration daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("debug-level")
                .short("D")
                .long("debug-level")
                .value_name("level")
                .help("Debug verbosity (0..3)."),
        )
        .arg(
            Arg::with_name("config-file")
                .short("f")
                .long("config-file")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("log-destination")
                .short("l")
                .long("log-destination")
                .value_name("s|e|o|f<file>")
                .help("Log to syslog, stderr, stdout or a file."),
        )
        .arg(
            Arg::with_name("plugin-dir")
                .short("d")
                .long("plugin-dir")
                .value_name("dir")
                .help("Backend plugin directory."),
        )
        .arg(
            Arg::with_name("yang-dir")
                .short("p")
                .long("yang-dir")
                .value_name("dir")
                .multiple(true)
                .number_of_values(1)
                .help("Additional YANG search directory (repeatable)."),
        )
        .arg(
            Arg::with_name("datastore-dir")
                .short("b")
                .long("datastore-dir")
                .value_name("dir")
                .help("Persisted datastore directory."),
        )
        .arg(
            Arg::with_name("foreground")
                .short("F")
                .long("foreground")
                .help("Run in the foreground, do not daemonize."),
        )
        .arg(
            Arg::with_name("zap")
                .short("z")
                .long("zap")
                .help("Terminate a previously running daemon and exit."),
        )
        .arg(
            Arg::with_name("socket-family")
                .short("a")
                .long("socket-family")
                .value_name("UNIX|IPv4|IPv6")
                .help("Server socket address family."),
        )
        .arg(
            Arg::with_name("socket-address")
                .short("u")
                .long("socket-address")
                .value_name("path|addr")
                .help("Server socket path or IP address."),
        )
        .arg(
            Arg::with_name("pid-file")
                .short("P")
                .long("pid-file")
                .value_name("file")
                .help("Pid file path."),
        )
        .arg(
            Arg::with_name("run-once")
                .short("1")
                .long("run-once")
                .help("Run the startup sequence and exit."),
        )
        .arg(
            Arg::with_name("startup-mode")
                .short("s")
                .long("startup-mode")
                .value_name("none|init|running|startup")
                .help("How to recover the running datastore on boot."),
        )
        .arg(
            Arg::with_name("extra-xml")
                .short("c")
                .long("extra-xml")
                .value_name("file")
                .help("Overlay configuration merged without commit."),
        )
        .arg(
            Arg::with_name("socket-group")
                .short("g")
                .long("socket-group")
                .value_name("group")
                .help("Group membership required of UNIX clients."),
        )
        .arg(
            Arg::with_name("yang-main-file")
                .short("y")
                .long("yang-main-file")
                .value_name("file")
                .help("Override the main YANG module file."),
        )
        .arg(
            Arg::with_name("storage-plugin")
                .short("x")
                .long("storage-plugin")
                .value_name("name")
                .help("Datastore persistence backend."),
        )
        .arg(
            Arg::with_name("option")
                .short("o")
                .long("option")
                .value_name("key=value")
                .multiple(true)
                .number_of_values(1)
                .help("Override any configuration option."),
        );
    let matches = match app.get_matches_safe() {
        Ok(matches) => matches,
        Err(error) => {
            eprintln!("{}", error.message);
            std::process::exit(EXIT_USAGE);
        }
    };

    // Read the configuration file and apply the overrides.
    let config_file = matches.value_of("config-file").map(Path::new);
    let mut config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(EXIT_FATAL);
        }
    };
    if let Err(error) = apply_cli_options(&mut config, &matches) {
        eprintln!("{error}");
        std::process::exit(EXIT_USAGE);
    }
    let foreground = matches.is_present("foreground");
    let run_once = matches.is_present("run-once");

    if matches.is_present("zap") {
        zap(&config);
        std::process::exit(0);
    }

    // Initialize tracing.
    init_tracing(&config, foreground);

    // Refuse to start when another instance is running.
    if let Some(pid) = read_pidfile(&config.pid_file)
        && pid_alive(pid)
    {
        error!(%pid, "daemon already running (try --zap)");
        std::process::exit(EXIT_FATAL);
    }

    let Some(startup_mode) = config.startup_mode else {
        error!(
            "startup mode undefined: set the startup-mode option or pass -s"
        );
        std::process::exit(EXIT_FATAL);
    };

    if let Err(error) = std::fs::create_dir_all(&config.datastore_dir) {
        error!(%error, dir = %config.datastore_dir.display(),
            "failed to create datastore directory");
        std::process::exit(EXIT_FATAL);
    }

    // Load the schema through the external parser seam.
    let mut schema = SchemaContext::new();
    let loader = NullLoader;
    if let Err(error) = loader.load(
        &mut schema,
        &config.yang_dirs,
        config.yang_main_file.as_deref(),
    ) {
        error!(%error, "failed to load YANG modules");
        std::process::exit(EXIT_FATAL);
    }
    if schema.modules().next().is_none() {
        warn!("no YANG modules loaded, running with an empty schema");
    }

    // Select the persistence backend.
    let store: Box<dyn Store> = match config.storage_plugin.as_str() {
        "xml" => Box::new(XmlFileStore::new(
            config.datastore_dir.clone(),
            config.pretty_store,
        )),
        other => {
            error!(plugin = %other, "unknown storage plugin");
            std::process::exit(EXIT_FATAL);
        }
    };
    let datastores = DatastoreRegistry::new(store);

    let mut context = Context::new(
        Arc::new(schema),
        datastores,
        Box::new(AlwaysTrue),
        Box::new(PermitAll),
        config.compat_mode,
        config.module_state_path(),
    );

    // Backend plugins register here. Plugin loading mechanics live outside
    // the core; the bus only carries the callback contract.
    if let Err(error) = context.plugins.init_all() {
        error.log();
        std::process::exit(EXIT_FATAL);
    }

    info!("starting up");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to create async runtime");
            std::process::exit(EXIT_FATAL);
        }
    };

    let exit_code = runtime.block_on(async {
        // Recover the running datastore.
        match core::startup::run(
            &mut context,
            startup_mode,
            config.extra_xml.as_deref(),
        ) {
            Ok(report) => {
                info!(status = ?report.status, "startup finished");
            }
            Err(error) => {
                error!(%error, "fatal startup error");
                return EXIT_FATAL;
            }
        }
        if run_once {
            return 0;
        }

        // Serve clients.
        let (request_tx, request_rx) = mpsc::channel(4);
        let _listener = match listener::start(&config, request_tx).await {
            Ok(task) => task,
            Err(error) => {
                error!(%error, "failed to bind server socket");
                return EXIT_FATAL;
            }
        };

        if let Err(error) = write_pidfile(&config.pid_file) {
            error!(%error, "failed to write pid file");
            return EXIT_FATAL;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            let mut sigint = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::interrupt(),
            ) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            let mut sighup = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::hangup(),
            ) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        let _ = shutdown_tx.send(()).await;
                    }
                    _ = sigint.recv() => {
                        let _ = shutdown_tx.send(()).await;
                    }
                    _ = sighup.recv() => {
                        // Configuration re-read is not implemented.
                        info!("SIGHUP received, ignoring");
                    }
                }
            }
        });

        Core::new(context, request_rx).run(shutdown_rx).await;
        0
    });

    // Graceful teardown: flush the pid file and unlink the UNIX socket.
    let _ = std::fs::remove_file(&config.pid_file);
    if config.socket_family == config::SocketFamily::Unix {
        let _ = std::fs::remove_file(&config.socket_address);
    }
    info!("terminated");
    std::process::exit(exit_code);
}

// ===== helper functions =====

fn apply_cli_options(
    config: &mut Config,
    matches: &clap::ArgMatches<'_>,
) -> Result<(), String> {
    // Generic overrides first, specific flags second: an explicit flag
    // wins over its -o form.
    if let Some(options) = matches.values_of("option") {
        for option in options {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| format!("malformed option '{option}'"))?;
            config.set_option(key, value)?;
        }
    }

    for key in [
        "debug-level",
        "log-destination",
        "plugin-dir",
        "datastore-dir",
        "socket-family",
        "socket-address",
        "socket-group",
        "pid-file",
        "startup-mode",
        "extra-xml",
        "yang-main-file",
        "storage-plugin",
    ] {
        if let Some(value) = matches.value_of(key) {
            config.set_option(key, value)?;
        }
    }
    if let Some(dirs) = matches.values_of("yang-dir") {
        for dir in dirs {
            config.yang_dirs.push(PathBuf::from(dir));
        }
    }
    Ok(())
}
