use demo::customers::{self, CustomerOrderCache};
use demo::{Shop, orders};
use ddd_messaging::MessagingSettings;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CUSTOMER: &str = "cust-001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = match std::env::var("MESSAGING_SETTINGS") {
        Ok(path) => MessagingSettings::from_path(path)?,
        Err(_) => MessagingSettings::from_json_str(include_str!("../messaging.json"))?,
    };
    let shop = Shop::new(&settings)?;
    let handle = shop.start()?;

    let first = orders::place_order(&shop.orders, CUSTOMER, 4_990).await?;
    let second = orders::place_order(&shop.orders, CUSTOMER, 12_500).await?;
    orders::cancel_order(&shop.orders, &second).await?;
    info!(%first, %second, "orders submitted");

    let customers_db = shop.customers.store().clone();
    let synced = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let mirrored = customers::orders_of(&customers_db, CUSTOMER).await?;
            let done = mirrored.len() == 2
                && mirrored
                    .iter()
                    .any(|o| o.id == second && o.status == orders::OrderStatus::Cancelled);
            if done {
                return anyhow::Ok(mirrored);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    tokio::select! {
        res = synced => match res {
            Ok(mirrored) => print_cache(&mirrored?),
            Err(_) => warn!("customer cache not in sync before timeout"),
        },
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    handle.shutdown();
    handle.join().await;
    Ok(())
}

fn print_cache(orders: &[CustomerOrderCache]) {
    for order in orders {
        println!(
            "{}  {:>8.2}  {}",
            order.id,
            order.total_cents as f64 / 100.0,
            order.status.as_str()
        );
    }
}
