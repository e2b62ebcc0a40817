use std::process::ExitCode;

/// Grace period after a shutdown signal before force-exiting (seconds).
const SHUTDOWN_GRACE_SECS: u64 = 10;

#[tokio::main]
async fn main() -> ExitCode {
    // `run` cancels queued reports on the first signal and lets the in-flight
    // one finish. A stuck command must not hold the process forever.
    tokio::spawn(async {
        remedy::cli::shutdown_signal().await;
        tokio::time::sleep(std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
        eprintln!("Shutdown grace period expired, forcing exit.");
        std::process::exit(1);
    });

    match remedy::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(remedy::errors::get_exit_code(&e))
        }
    }
}
