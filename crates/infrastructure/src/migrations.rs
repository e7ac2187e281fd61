/// 嵌入式迁移，进程启动时由 main 执行。
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
