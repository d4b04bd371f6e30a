use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reply_tree::config::Config;
use reply_tree::db::{self, SqlRemote};
use reply_tree::store::PostStore;
use reply_tree::tree::count_nodes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reply_tree=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::init_db(&config.database_url, config.max_connections).await?;
    tracing::info!("Database initialized");

    let viewer = db::load_author(&pool, &config.viewer_id).await?;
    if viewer.is_none() {
        tracing::warn!(viewer_id = %config.viewer_id, "Viewer not found");
    }

    let remote = Arc::new(SqlRemote::new(pool, config.viewer_id.clone()));
    let mut store = PostStore::new(remote, viewer, Vec::new())?;

    store.load_more_posts(config.feed_page_size);
    store.settle().await;

    // First page of replies under every root.
    let root_ids: Vec<String> = store.posts().iter().map(|post| post.id.clone()).collect();
    store.transition(|store| {
        for root_id in &root_ids {
            store.load_more_children(root_id, config.feed_page_size);
        }
    });
    store.settle().await;

    tracing::info!(
        roots = store.posts().len(),
        nodes = count_nodes(store.posts()),
        "Feed loaded"
    );

    println!("{}", serde_json::to_string_pretty(store.posts())?);

    Ok(())
}
