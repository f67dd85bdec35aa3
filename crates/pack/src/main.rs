use clap::Parser;

mod cli;
mod commands;

fn main() {
    let parsed = cli::Cli::parse();
    let verbose = parsed.verbose;

    if let Err(e) = pack_core::logging::init_with_verbosity(verbose) {
        eprintln!("Error: failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(parsed));
    std::process::exit(exit_code);
}

/// Install a SIGINT/SIGTERM handler that cancels the shared cancellation
/// token, then dispatch the parsed command and map its result to a process
/// exit code (cancellation exits 130 on POSIX, 1 on Windows).
async fn run(cli: cli::Cli) -> i32 {
    let cancel = tokio_util::sync::CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        signal_cancel.cancel();
    });

    match commands::dispatch(cli, cancel).await {
        Ok(()) => 0,
        Err(e) => {
            let exit_code = e.exit_code();
            eprintln!("Error: {e}");
            exit_code
        }
    }
}
