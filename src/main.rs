use leapscan::export::export_rows;
use leapscan::pipeline::Screener;

fn watchlist_from_env() -> Vec<String> {
    std::env::var("WATCHLIST")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("leapscan starting");

    let screener = match Screener::from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let watchlist = watchlist_from_env();
    if watchlist.is_empty() {
        tracing::error!("WATCHLIST is empty; set WATCHLIST=AAPL,MSFT,...");
        std::process::exit(1);
    }

    // The rate is a real input; there is no default.
    let rate = match std::env::var("RISK_FREE_RATE").map(|v| v.parse::<f64>()) {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            tracing::error!("RISK_FREE_RATE unparseable: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            tracing::error!("RISK_FREE_RATE is not set");
            std::process::exit(1);
        }
    };

    let report = match screener.run(&watchlist, rate).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("screening run failed: {e}");
            std::process::exit(1);
        }
    };

    for failure in &report.failures {
        tracing::warn!(symbol = %failure.symbol, error = %failure.error, "symbol failed");
    }
    for stats in screener.usage() {
        tracing::info!(
            provider = %stats.provider,
            requests = stats.requests_used,
            failures = stats.failures,
            budget_remaining = ?stats.budget_remaining,
            "provider usage"
        );
    }

    let rows = export_rows(&report.top);
    match serde_json::to_string_pretty(&rows) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("export serialization failed: {e}");
            std::process::exit(1);
        }
    }
}
