use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use club_lotto::api::{HttpNotifier, RandomOrgClient, StripeClient};
use club_lotto::config;
use club_lotto::connection::conn;
use club_lotto::mcp_handler::{MCPHandler, stdio};
use club_lotto::settlement::DrawSettlement;
use club_lotto::use_cases::{DrawUseCase, EntryUseCase, ResultsUseCase};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = config::load()?;

    tracing::info!("Let's draw some numbers.");

    let db_conn = conn(&config.database_url)?;
    let db_conn_arc = Arc::new(db_conn);

    let settlement = DrawSettlement::new(
        Arc::clone(&db_conn_arc),
        RandomOrgClient::new(&config.random_org_url, &config.random_org_api_key),
        StripeClient::new(&config.stripe_api_url, &config.stripe_secret_key),
        HttpNotifier::new(&config.notify_winners_url, &config.renewal_reminder_url),
        &config.lottery_name,
        config.lucky_dip_prize_pence,
    );

    let draw_use_case = DrawUseCase::new(settlement);
    let results_use_case = ResultsUseCase::new(Arc::clone(&db_conn_arc));
    let entry_use_case = EntryUseCase::new(Arc::clone(&db_conn_arc));

    let handler = MCPHandler::new(
        Arc::new(draw_use_case),
        Arc::new(results_use_case),
        Arc::new(entry_use_case),
    );

    let (reader, writer) = stdio();

    handler.serve(reader, writer).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    Ok(())
}
