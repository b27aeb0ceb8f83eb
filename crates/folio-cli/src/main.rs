//! Demo: drive a full issue lifecycle and a settlement against the
//! in-memory stack with a mock chain.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use folio_core::domain::{Address, Issue, IssueId, IssueStatus, User};
use folio_core::impls::{InMemoryMarketRepo, InMemorySharedStore, MockChain};
use folio_core::ports::{ChainClient, Clock, MarketRepo, SharedStore, SystemClock};
use folio_core::{Market, MarketConfig};

fn demo_issue(author: &User, duration: i64) -> Issue {
    Issue {
        id: IssueId::generate(),
        author: author.id,
        token_id: 7,
        quantity: 10,
        price: 2.0,
        royalty: 10.0,
        buy_limit: 5,
        published_at: Utc::now(),
        duration,
        n_circulations: 0,
        status: IssueStatus::PreSale,
        destroy_log: String::new(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    // (A) Wire the market: in-memory repo + shared store, mock chain.
    let repo = Arc::new(InMemoryMarketRepo::new());
    let chain = Arc::new(MockChain::new());
    let config = MarketConfig {
        poll_interval: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(500),
        ..MarketConfig::default()
    };
    let market = Market::new(
        repo.clone() as Arc<dyn MarketRepo>,
        chain.clone() as Arc<dyn ChainClient>,
        Arc::new(InMemorySharedStore::new()) as Arc<dyn SharedStore>,
        Arc::new(SystemClock) as Arc<dyn Clock>,
        config,
    );

    let author = User::new(Address::new("0xa00a"));
    let buyer = User::new(Address::new("0xb00b"));
    market.register_user(author.clone()).await.unwrap();
    market.register_user(buyer.clone()).await.unwrap();

    // (B) Start the periodic driver (issue timer + compensation sweep).
    let driver = market.driver();

    // (C) An issue with a zero-minute window: watch it open and expire.
    let flash = demo_issue(&author, 0);
    market.publish_issue(flash.clone()).await.unwrap();
    let status = wait_for_terminal(&market, flash.id).await;
    info!(issue = %flash.id, ?status, "flash sale finished");

    // (D) A longer sale: buy three units first-class, then watch a failed
    // purchase get refunded by the sweep.
    let sale = demo_issue(&author, 60);
    market.publish_issue(sale.clone()).await.unwrap();
    loop {
        if market.repo().issue(sale.id).await.unwrap().status == IssueStatus::OnSale {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let trade = market
        .repo()
        .first_release_trade(sale.id)
        .await
        .unwrap()
        .expect("first release listed");

    let txn = market.submit_purchase(trade.id, buyer.id, 3).await.unwrap();
    let settled = market.repo().transaction(txn).await.unwrap();
    info!(txn = %txn, status = ?settled.status, hash = %settled.hash, "first-class purchase settled");

    chain.reject_next_trades(1);
    let failed = market.submit_purchase(trade.id, buyer.id, 1).await.unwrap();
    info!(txn = %failed, "chain rejected this one; the sweep will refund it");
    loop {
        if market.repo().transaction(failed).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(txn = %failed, "refunded and cleared");

    // (E) Final state.
    let counts = market.counts().await.unwrap();
    println!("{}", serde_json::to_string_pretty(&counts).unwrap());

    driver.shutdown_and_join().await;
}

async fn wait_for_terminal(market: &Market, id: IssueId) -> IssueStatus {
    loop {
        let status = market.repo().issue(id).await.unwrap().status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
