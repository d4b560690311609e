use std::time::Duration;

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::{info, warn};

use crate::entity::asset;

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    sync_schema(&db).await?;

    Ok(db)
}

/// Create the `asset` table and its secondary indexes if they do not exist.
pub async fn sync_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut create = Schema::new(backend).create_table_from_entity(asset::Entity);
    create.if_not_exists();
    db.execute_raw(backend.build(&create)).await?;

    ensure_indexes(db).await;
    Ok(())
}

/// Ensure the lookup indexes used by the lifecycle queries exist.
///
/// Index creation failures are logged, not fatal: queries still work
/// without them, only slower.
async fn ensure_indexes<C: ConnectionTrait>(db: &C) {
    let backend = db.get_database_backend();

    let indexes: [(&str, IndexCreateStatement); 3] = [
        // Staged uploads of one owner: reconcile and confirm/select.
        (
            "idx_asset_owner_state",
            Index::create()
                .if_not_exists()
                .name("idx_asset_owner_state")
                .table(asset::Entity)
                .col(asset::Column::OwnerId)
                .col(asset::Column::State)
                .to_owned(),
        ),
        // Assets of one content entity: reconcile and cascade delete.
        (
            "idx_asset_entity",
            Index::create()
                .if_not_exists()
                .name("idx_asset_entity")
                .table(asset::Entity)
                .col(asset::Column::EntityType)
                .col(asset::Column::EntityId)
                .to_owned(),
        ),
        // Sweep: SELECT ... WHERE state = 'staged' AND updated_at < ?
        (
            "idx_asset_state_updated",
            Index::create()
                .if_not_exists()
                .name("idx_asset_state_updated")
                .table(asset::Entity)
                .col(asset::Column::State)
                .col(asset::Column::UpdatedAt)
                .to_owned(),
        ),
    ];

    for (name, stmt) in indexes {
        match db.execute_raw(backend.build(&stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }
}
