use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let create_conversations_sql = r#"
            CREATE TABLE IF NOT EXISTS chat.conversations (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                tenant_id UUID NOT NULL,
                conversation_type TEXT NOT NULL
                    CHECK (conversation_type IN ('direct', 'group', 'broadcast')),
                name VARCHAR(255),
                description TEXT,
                direct_key VARCHAR(73),
                created_by UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT conversations_direct_key_present
                    CHECK ((conversation_type = 'direct') = (direct_key IS NOT NULL))
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_conversations_sql)
            .await?;

        // At most one direct conversation per unordered user pair in a tenant
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS conversations_tenant_direct_key_unique
                    ON chat.conversations (tenant_id, direct_key)
                    WHERE direct_key IS NOT NULL",
            )
            .await?;

        let create_participants_sql = r#"
            CREATE TABLE IF NOT EXISTS chat.participants (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                conversation_id UUID NOT NULL
                    REFERENCES chat.conversations(id) ON DELETE CASCADE ON UPDATE CASCADE,
                user_id UUID NOT NULL,
                role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),
                joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_read_at TIMESTAMPTZ,
                is_muted BOOLEAN NOT NULL DEFAULT FALSE,
                is_pinned BOOLEAN NOT NULL DEFAULT FALSE,
                is_archived BOOLEAN NOT NULL DEFAULT FALSE,

                CONSTRAINT participants_conversation_user_unique UNIQUE (conversation_id, user_id)
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_participants_sql)
            .await?;

        let create_messages_sql = r#"
            CREATE TABLE IF NOT EXISTS chat.messages (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                conversation_id UUID NOT NULL
                    REFERENCES chat.conversations(id) ON DELETE CASCADE ON UPDATE CASCADE,
                sender_id UUID NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'sent'
                    CHECK (status IN ('sent', 'delivered', 'read')),
                reply_to_id UUID REFERENCES chat.messages(id) ON DELETE SET NULL,
                is_edited BOOLEAN NOT NULL DEFAULT FALSE,
                edited_at TIMESTAMPTZ,
                delivered_at TIMESTAMPTZ,
                read_at TIMESTAMPTZ,
                ephemeral_seconds INTEGER CHECK (ephemeral_seconds BETWEEN 1 AND 604800),
                ephemeral_expires_at TIMESTAMPTZ,
                deleted_at TIMESTAMPTZ,
                deletion_reason TEXT CHECK (deletion_reason IN ('sender', 'expired')),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT messages_ephemeral_expiry_present
                    CHECK ((ephemeral_seconds IS NULL) = (ephemeral_expires_at IS NULL)),
                CONSTRAINT messages_deletion_reason_present
                    CHECK ((deleted_at IS NULL) = (deletion_reason IS NULL))
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_messages_sql)
            .await?;

        let create_reactions_sql = r#"
            CREATE TABLE IF NOT EXISTS chat.reactions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                message_id UUID NOT NULL
                    REFERENCES chat.messages(id) ON DELETE CASCADE ON UPDATE CASCADE,
                user_id UUID NOT NULL,
                reaction_type VARCHAR(32) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT reactions_message_user_type_unique
                    UNIQUE (message_id, user_id, reaction_type)
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_reactions_sql)
            .await?;

        for table in ["conversations", "participants", "messages", "reactions"] {
            manager
                .get_connection()
                .execute_unprepared(&format!("ALTER TABLE chat.{table} OWNER TO teamchat"))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse dependency order
        for table in ["reactions", "messages", "participants", "conversations"] {
            manager
                .get_connection()
                .execute_unprepared(&format!("DROP TABLE IF EXISTS chat.{table}"))
                .await?;
        }

        Ok(())
    }
}
