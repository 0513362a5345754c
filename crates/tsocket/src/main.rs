use std::io::{self, Write};
use std::process::ExitCode;

use tsocket::daemon::{self, SystemConfigLoader};

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            return fail(&format!("failed to start async runtime: {error}"));
        }
    };

    match runtime.block_on(daemon::run_daemon_with(&SystemConfigLoader, ctrl_c())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => fail(&error.to_string()),
    }
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for ctrl-c; shutting down");
    }
}

fn fail(message: &str) -> ExitCode {
    #[expect(
        clippy::let_underscore_must_use,
        reason = "stderr is the last channel left; the exit code still reports the failure"
    )]
    let _ = report(&mut io::stderr(), message);
    ExitCode::FAILURE
}

fn report(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "tsocketd: {message}")
}
