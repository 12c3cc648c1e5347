/// 数据库迁移器，迁移脚本位于仓库根目录 `migrations/`。
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
