use clap::Parser;
use spot_exchange_core::{
    api,
    config::Config,
    coordinator::Coordinator,
    orders,
    state::AppState,
    store::Store,
    utils::shutdown_token,
};
use tokio::net::TcpListener;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = Store::open(&config.store_path)?;

    // Ticks are part of the store's persisted "source of truth for
    // recovery" (spec §4.4): reseed the in-process counter above every
    // tick already on disk before admitting any order, so restart never
    // reissues a tick that sorts behind (or collides with) one already
    // persisted for this ticker/user.
    orders::seed_tick(store.max_tick()?);

    let coordinator = Coordinator::new(store);

    // Recovery (spec §5, §8 invariant 2): the ledger is rebuilt from the
    // persisted `balances` column before the book is rebuilt from open
    // orders, so every resting order rehydrated below finds its matching
    // frozen reservation already in place.
    coordinator.rehydrate_ledger()?;
    for instrument in coordinator.store.list_instruments()? {
        coordinator.rehydrate_book(&instrument.ticker).await?;
    }

    let state = AppState::new(coordinator);
    let app = api::router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");

    let token = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;

    Ok(())
}
