use queue_overflow_cli::run_cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Logging may not be initialized yet when configuration fails.
        eprintln!("queue-overflow: {}", e);
        std::process::exit(e.exit_code());
    }
}
