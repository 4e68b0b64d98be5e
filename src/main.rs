use std::sync::Arc;

use fieldtrack::db::TrackerDb;
use fieldtrack::poller;
use fieldtrack::state::AppState;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Open once up front so migrations run (and fail loudly) before the
    // poll loop starts.
    match TrackerDb::open() {
        Ok(_) => log::info!("Database ready"),
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    }

    let state = Arc::new(AppState::new());

    log::info!("Starting tracker poller");
    poller::run_tracker_poller(state).await;
}
