//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储适配器，实现应用层定义的仓储接口。
//! 入场的容量守护、滑动/匹配/申请的唯一性都在这里用单个事务兑现。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgActivityRepository, PgApplicationRepository, PgChatRoomRepository,
    PgMatchRepository, PgMessageRepository, PgSwipeRepository, PgUserDirectory,
};
