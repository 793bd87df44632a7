use clap::Parser;
use cmapi_checker::{ApiChecker, CheckerConfig, DEFAULT_GROUP, DEFAULT_NAMESPACE, DEFAULT_VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cmapichecker")]
#[command(about = "Check whether the cert-manager API is ready to accept Certificates")]
#[command(version)]
struct Cli {
    /// Path to the kubeconfig file
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use
    #[arg(long)]
    context: Option<String>,
    /// Namespace the dry-run Certificate is submitted to
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    /// API group serving the Certificate kind
    #[arg(long, default_value = DEFAULT_GROUP)]
    group: String,
    /// API version of the Certificate kind
    #[arg(long, default_value = DEFAULT_VERSION)]
    api_version: String,
    /// Keep checking for up to this many seconds until the API is ready
    #[arg(long, default_value_t = 0)]
    wait: u64,
    /// Seconds between attempts while waiting
    #[arg(long, default_value_t = 5)]
    interval: u64,
    /// Deadline in seconds for a single attempt
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            namespace: self.namespace.clone(),
            group: self.group.clone(),
            version: self.api_version.clone(),
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let checker = ApiChecker::new(&cli.checker_config()).await?;

    let timeout = Duration::from_secs(cli.timeout);
    let interval = Duration::from_secs(cli.interval);
    let deadline = wait_deadline(Instant::now(), Duration::from_secs(cli.wait));

    loop {
        match checker.check_with_timeout(timeout).await {
            Ok(()) => {
                println!("The cert-manager API is ready");
                return Ok(ExitCode::SUCCESS);
            }
            Err(err) if retry_allowed(Instant::now(), deadline, interval) => {
                info!(error = %err, "Not ready, retrying in {}s", interval.as_secs());
                tokio::time::sleep(interval).await;
            }
            Err(err) => {
                eprintln!("{err}");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
}

/// `None` when `wait` reaches past what `Instant` can represent, meaning no
/// deadline.
fn wait_deadline(now: Instant, wait: Duration) -> Option<Instant> {
    now.checked_add(wait)
}

fn retry_allowed(now: Instant, deadline: Option<Instant>, interval: Duration) -> bool {
    match deadline {
        None => true,
        Some(deadline) => now
            .checked_add(interval)
            .is_some_and(|next_attempt| next_attempt < deadline),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}
