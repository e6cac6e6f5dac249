use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tipline::application::service::PaymentService;
use tipline::application::worker::Worker;
use tipline::config::Config;
use tipline::domain::payment::SettlementResult;
use tipline::infrastructure::audit::AuditLog;
use tipline::infrastructure::breaker::CircuitBreaker;
use tipline::infrastructure::build_ledger;
use tipline::infrastructure::idempotency::IdempotencyGuard;
use tipline::infrastructure::queue::JobQueue;
use tipline::infrastructure::rate_limit::RateLimiter;
use tipline::interfaces::csv::request_reader::RequestReader;
use tipline::interfaces::csv::result_writer::ResultWriter;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payment requests CSV file (columns: from,to,amount,key)
    input: PathBuf,

    /// Path to the append-only audit log
    #[arg(long, default_value = "audit.log")]
    audit_log: PathBuf,

    /// Number of worker tasks
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().into_diagnostic()?;

    let ledger = build_ledger(&config.ledger).into_diagnostic()?;
    let breaker = Arc::new(CircuitBreaker::new(config.breaker));
    let audit = Arc::new(AuditLog::open(&cli.audit_log).await.into_diagnostic()?);
    let queue = Arc::new(JobQueue::new("payments", config.queue));

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    for _ in 0..cli.workers.max(1) {
        let worker = Worker::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            Arc::clone(&breaker),
            Arc::clone(&audit),
        );
        workers.push(worker.spawn(shutdown_rx.clone()));
    }

    let wait_budget = config.queue.total_retry_budget(config.breaker.call_timeout);
    let service = PaymentService::new(
        Arc::new(IdempotencyGuard::new(config.idempotency)),
        Arc::new(RateLimiter::new(config.rate_limit)),
        Arc::clone(&queue),
        wait_budget,
    );

    // Process requests
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let stdout = io::stdout();
    let mut writer = ResultWriter::new(stdout.lock());
    for row in reader.requests() {
        match row {
            Ok(request) => {
                let echo = request.clone();
                match service.request_payment(request).await {
                    Ok(result) => {
                        writer.write_result(&echo, &result).into_diagnostic()?;
                    }
                    Err(e) => {
                        eprintln!("Error processing request: {}", e);
                        writer
                            .write_result(&echo, &SettlementResult::failed(e.code()))
                            .into_diagnostic()?;
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading request: {}", e);
            }
        }
    }
    writer.flush().into_diagnostic()?;

    // Drain workers before exiting
    let _ = shutdown.send(true);
    for handle in workers {
        handle.await.into_diagnostic()?;
    }

    Ok(())
}
