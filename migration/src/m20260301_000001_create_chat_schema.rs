use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create the chat schema
        manager
            .get_connection()
            .execute_unprepared("CREATE SCHEMA IF NOT EXISTS chat;")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("SET search_path TO chat, public;")
            .await?;

        // Grant the application role everything it needs inside the schema
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    GRANT ALL PRIVILEGES ON DATABASE teamchat TO teamchat;
                    GRANT ALL ON SCHEMA chat TO teamchat;

                    ALTER DEFAULT PRIVILEGES IN SCHEMA chat GRANT ALL ON TABLES TO teamchat;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA chat GRANT ALL ON SEQUENCES TO teamchat;
                END $$;
            "#)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    ALTER DEFAULT PRIVILEGES IN SCHEMA chat REVOKE ALL ON SEQUENCES FROM teamchat;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA chat REVOKE ALL ON TABLES FROM teamchat;
                    REVOKE ALL ON SCHEMA chat FROM teamchat;
                    REVOKE ALL PRIVILEGES ON DATABASE teamchat FROM teamchat;
                END $$;
            "#)
            .await?;

        // Drop the schema (CASCADE will remove all objects in it)
        manager
            .get_connection()
            .execute_unprepared("DROP SCHEMA IF EXISTS chat CASCADE;")
            .await?;

        Ok(())
    }
}
