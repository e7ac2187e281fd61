//! 主应用程序入口
//!
//! 启动匹配与实时消息服务。

use std::sync::Arc;

use application::{
    AdmissionService, ChatRoomRegistry, ChatService, ChatServiceDependencies, MatchingService,
    MatchingServiceDependencies, RoomBroadcaster, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PgActivityRepository, PgApplicationRepository, PgChatRoomRepository,
    PgMatchRepository, PgMessageRepository, PgSwipeRepository, PgUserDirectory, MIGRATOR,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    MIGRATOR.run(&pg_pool).await?;

    // 仓储实例
    let activity_repository = Arc::new(PgActivityRepository::new(pg_pool.clone()));
    let swipe_repository = Arc::new(PgSwipeRepository::new(pg_pool.clone()));
    let match_repository = Arc::new(PgMatchRepository::new(pg_pool.clone()));
    let application_repository = Arc::new(PgApplicationRepository::new(pg_pool.clone()));
    let chat_room_repository = Arc::new(PgChatRoomRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let user_directory = Arc::new(PgUserDirectory::new(pg_pool));

    let clock = Arc::new(SystemClock::default());

    // 准入服务和房间注册表；注册表同时充当房间广播器
    let admission = Arc::new(AdmissionService::new(
        activity_repository.clone(),
        match_repository.clone(),
    ));
    let registry = Arc::new(ChatRoomRegistry::new(
        admission.clone(),
        config.registry.send_queue_capacity,
    ));
    let broadcaster: Arc<dyn RoomBroadcaster> = registry.clone();

    // 应用层服务
    let matching_service = MatchingService::new(MatchingServiceDependencies {
        activity_repository,
        swipe_repository,
        match_repository,
        application_repository,
        user_directory,
        clock: clock.clone(),
        broadcaster: broadcaster.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        admission,
        chat_room_repository,
        message_repository,
        clock,
        broadcaster,
    });

    let state = AppState::new(
        Arc::new(matching_service),
        Arc::new(chat_service),
        registry,
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("匹配与实时消息服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
