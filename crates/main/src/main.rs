//! 主应用程序入口
//!
//! 启动实时私信服务的 Axum Web API。

use std::sync::Arc;

use application::{
    MessageRelay, MessageRelayDependencies, PresenceTracker, RoomRegistry, SignalRouter,
    SystemClock,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgMessageStore, PgUserDirectory, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, SessionTokens};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate().map_err(|err| {
        tracing::error!(error = %err, "配置校验失败");
        err
    })?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    MIGRATOR.run(&pg_pool).await?;

    // 持久化网关与用户目录
    let store = Arc::new(PgMessageStore::new(pg_pool.clone()));
    let directory = Arc::new(PgUserDirectory::new(pg_pool));

    // 实时层核心组件
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let rooms = Arc::new(RoomRegistry::new());
    let presence = Arc::new(PresenceTracker::new());
    let signals = Arc::new(SignalRouter::new(rooms.clone(), clock));
    let relay = Arc::new(MessageRelay::new(MessageRelayDependencies {
        store: store.clone(),
        directory: directory.clone(),
        rooms: rooms.clone(),
    }));

    let sessions = Arc::new(SessionTokens::new(config.session.clone()));

    let state = AppState::new(relay, rooms, presence, signals, store, directory, sessions);

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("实时私信服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
