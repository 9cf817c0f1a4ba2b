//! Process startup configuration, in the teacher's `clap`-derive style
//! (see the old `cli.rs`/`main.rs` `Commands::Server { port }` arm),
//! generalized from a single positional port into the small set of
//! flags a persistent, logged server actually needs.
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "spot-exchange-core")]
#[command(version, about = "Matching core for a centralized spot exchange")]
pub struct Config {
    /// TCP port the HTTP surface binds to.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Directory for the parity-db store.
    #[arg(long, default_value = "exchange_store")]
    pub store_path: String,

    /// Maximum tracing verbosity.
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}
