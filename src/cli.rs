use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    api::router,
    custody::InMemoryCustody,
    engine::Engine,
    orders::Side,
    state::{AppState, BootConfig},
    utils::shutdown_token,
};

/// CLI for the order matcher
#[derive(Parser)]
#[command(name = "order-matcher")]
#[command(
    version = "0.1",
    about = "A whitelist-gated order matcher with a linear, id-ordered matching scan"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/websocket server
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        /// Path of the persistent trade ledger
        #[arg(long, default_value = "trades-db")]
        db: PathBuf,

        /// Administrator identity for the settings gate
        #[arg(long, default_value = "admin")]
        admin: String,

        /// Initial fee rate in basis points
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u16).range(0..=100))]
        fee_bps: u16,

        /// Fee collector identity (defaults to the administrator)
        #[arg(long)]
        fee_collector: Option<String>,

        /// Asset to whitelist at boot; repeatable
        #[arg(long = "asset")]
        assets: Vec<String>,

        /// Boot with trading disabled; enable later through the admin API
        #[arg(long)]
        paused: bool,
    },

    /// Run a canned crossing session against an in-process engine
    Demo,
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            db,
            admin,
            fee_bps,
            fee_collector,
            assets,
            paused,
        } => {
            tracing_subscriber::fmt().init();
            let boot = BootConfig {
                admin,
                fee_collector,
                fee_rate_bps: fee_bps,
                trading_enabled: !paused,
                assets,
            };
            let state = AppState::new(&db, boot).context("opening trade ledger")?;
            let app = router(state);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "listening");
            let token = shutdown_token();
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await?;
            Ok(())
        }
        Commands::Demo => run_demo(),
    }
}

/// Whitelists BTC, funds a seller, crosses two orders and prints what
/// happened. Handy for eyeballing the matching semantics.
fn run_demo() -> anyhow::Result<()> {
    let mut engine = Engine::new(InMemoryCustody::new(), "admin".into());
    engine.whitelist_asset("admin", "BTC")?;
    engine.set_trading_enabled("admin", true)?;
    engine.custody_mut().deposit("alice", "BTC", 10);
    engine.custody_mut().approve("alice", "BTC", 10);

    let sell = engine.create_order("alice", "BTC", 10, 100, Side::Sell)?;
    println!("alice rests sell order {} (10 @ 100)", sell.order_id);

    let buy = engine.create_order("bob", "BTC", 4, 100, Side::Buy)?;
    println!("bob sends buy order {} (4 @ 100):", buy.order_id);
    if buy.trades.is_empty() {
        println!("no trades occured");
    } else {
        for trade in &buy.trades {
            println!(
                "  trade {}: {} units @ {} (buy #{} / sell #{})",
                trade.id, trade.amount, trade.execution_price, trade.buy_order_id, trade.sell_order_id
            );
        }
    }

    if let Some(resting) = engine.order(sell.order_id) {
        println!(
            "sell order {} remaining: {} (active: {})",
            resting.id, resting.amount, resting.active
        );
    }
    Ok(())
}
