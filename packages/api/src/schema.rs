use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};

use crate::entity::{contact_message, grading, purchase, user};

/// Creates the four tables from their entity definitions if they are missing.
/// Parents are created before children so the foreign keys resolve.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, user::Entity).await?;
    create_table(db, purchase::Entity).await?;
    create_table(db, grading::Entity).await?;
    create_table(db, contact_message::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    db.execute(backend.build(statement.if_not_exists())).await?;
    tracing::debug!(table = entity.table_name(), "Ensured table");
    Ok(())
}
