use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Conversation lists per tenant, most recently active first
        manager
            .create_index(
                Index::create()
                    .name("conversations_tenant_updated_at")
                    .table((Alias::new("chat"), Alias::new("conversations")))
                    .col(Alias::new("tenant_id"))
                    .col(Alias::new("updated_at"))
                    .to_owned(),
            )
            .await?;

        // Membership lookups by user (contacts, conversation lists)
        manager
            .create_index(
                Index::create()
                    .name("participants_user_id")
                    .table((Alias::new("chat"), Alias::new("participants")))
                    .col(Alias::new("user_id"))
                    .to_owned(),
            )
            .await?;

        // Unread counts and read-through updates scan a conversation by time
        manager
            .create_index(
                Index::create()
                    .name("messages_conversation_created_at")
                    .table((Alias::new("chat"), Alias::new("messages")))
                    .col(Alias::new("conversation_id"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        // The expiry sweeper only looks at live ephemeral messages
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS messages_ephemeral_expires_at
                    ON chat.messages (ephemeral_expires_at)
                    WHERE deleted_at IS NULL AND ephemeral_expires_at IS NOT NULL",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("reactions_message_id")
                    .table((Alias::new("chat"), Alias::new("reactions")))
                    .col(Alias::new("message_id"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, index) in [
            ("reactions", "reactions_message_id"),
            ("messages", "messages_conversation_created_at"),
            ("participants", "participants_user_id"),
            ("conversations", "conversations_tenant_updated_at"),
        ] {
            manager
                .drop_index(
                    Index::drop()
                        .name(index)
                        .table((Alias::new("chat"), Alias::new(table)))
                        .to_owned(),
                )
                .await?;
        }

        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS chat.messages_ephemeral_expires_at")
            .await?;

        Ok(())
    }
}
