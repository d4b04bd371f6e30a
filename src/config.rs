use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://reply_tree.db";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Id of the signed-in user the store acts for.
    pub viewer_id: String,
    pub feed_page_size: usize,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let viewer_id = lookup("VIEWER_ID").context("VIEWER_ID must be set")?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {}", value))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let feed_page_size = match lookup("FEED_PAGE_SIZE") {
            Some(value) => value
                .parse()
                .with_context(|| format!("FEED_PAGE_SIZE is not a number: {}", value))?,
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            database_url,
            max_connections,
            viewer_id,
            feed_page_size,
        })
    }
}
