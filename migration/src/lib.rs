pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_chat_schema;
mod m20260301_000002_create_chat_tables;
mod m20260301_000003_add_chat_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_chat_schema::Migration),
            Box::new(m20260301_000002_create_chat_tables::Migration),
            Box::new(m20260301_000003_add_chat_indexes::Migration),
        ]
    }
}
