//! `busbar-sf` command-line entry point.
//!
//! ```sh
//! export SF_INSTANCE_URL=https://example.my.salesforce.com
//! export SF_ACCESS_TOKEN=00D...
//! busbar-sf deploy start --metadata-dir mdapi --wait 10
//! ```

use std::sync::Arc;

use busbar_sf_cli::cli::Cli;
use tokio::sync::Notify;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    // Ctrl-C asks a waiting job to cancel instead of killing the process.
    let interrupt = Arc::new(Notify::new());
    let notify = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, requesting cancellation...");
            notify.notify_one();
        }
    });

    let code = busbar_sf_cli::run(cli, interrupt).await;
    std::process::exit(code);
}
