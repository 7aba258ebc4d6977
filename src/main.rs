use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use krishisahay_offline::{
    cache::CacheStorage,
    config::ProxyConfig,
    fetch::UpstreamFetcher,
    http::{HttpServer, HEALTH_PATH},
    OfflineInterceptor,
};

#[derive(Parser)]
#[command(name = "krishisahay-offline")]
#[command(about = "Offline-first caching proxy for the KrishiSahay web app")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[arg(short, long, default_value = "3005")]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Origin serving the web app and its API (overrides KRISHISAHAY_UPSTREAM)
    #[arg(long)]
    upstream: Option<String>,

    /// Current cache generation name (overrides KRISHISAHAY_CACHE_NAME)
    #[arg(long)]
    cache_name: Option<String>,

    /// Static asset to pre-cache on install; repeat for several
    #[arg(long = "asset")]
    assets: Vec<String>,

    /// Substring marking the query API route (overrides KRISHISAHAY_QUERY_ROUTE)
    #[arg(long)]
    query_route: Option<String>,

    /// Directory holding the cache generations (overrides KRISHISAHAY_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Upstream request timeout in seconds; must be greater than zero
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig::from_env();

        if let Some(upstream) = self.upstream {
            config.upstream = upstream;
        }
        if let Some(cache_name) = self.cache_name {
            config.cache_name = cache_name;
        }
        if !self.assets.is_empty() {
            config.static_assets = self.assets;
        }
        if let Some(query_route) = self.query_route {
            config.query_route = query_route;
        }
        if let Some(cache_dir) = self.cache_dir {
            config.cache_dir = cache_dir;
        }
        config.request_timeout = Duration::from_secs(self.timeout_secs);

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("krishisahay_offline={filter_level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let bind_addr = format!("{}:{}", args.host, args.port);
    let config = args.into_config();
    config.validate().context("invalid proxy configuration")?;

    let fetcher = UpstreamFetcher::new(config.upstream_url()?, config.request_timeout)
        .context("failed to build upstream client")?;
    info!("forwarding to upstream {}", fetcher.base());

    let storage = Arc::new(
        CacheStorage::load(&config.cache_dir)
            .await
            .with_context(|| format!("failed to load caches from {}", config.cache_dir.display()))?,
    );
    let interceptor = Arc::new(OfflineInterceptor::new(
        config,
        Arc::clone(&storage),
        Arc::new(fetcher),
    ));

    // A failed install leaves the previous generations in charge.
    if let Err(e) = interceptor.start().await {
        if !storage.has_entries().await {
            return Err(e).context("offline interceptor failed to install");
        }
        warn!("install failed, serving existing caches: {}", e);
    }

    let server = HttpServer::bind(&bind_addr, Arc::clone(&interceptor))
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    info!("KrishiSahay offline proxy started on {}", bind_addr);
    info!("   health: http://{}{}", bind_addr, HEALTH_PATH);

    server.serve().await.context("server error")
}
