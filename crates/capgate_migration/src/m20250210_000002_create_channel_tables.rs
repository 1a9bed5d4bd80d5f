use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建渠道表
        manager
            .create_table(
                Table::create()
                    .table(Channel::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Channel::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Channel::Type).string_len(20).not_null().unique_key())
                    .col(ColumnDef::new(Channel::Name).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(Channel::BaseUrl).string_len(255).not_null().default(""))
                    .col(ColumnDef::new(Channel::Config).json())
                    .col(ColumnDef::new(Channel::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(Channel::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Channel::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建渠道账号表
        manager
            .create_table(
                Table::create()
                    .table(ChannelAccount::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelAccount::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChannelAccount::ChannelId).integer().not_null())
                    .col(ColumnDef::new(ChannelAccount::Name).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(ChannelAccount::ApiKey).text().not_null())
                    .col(ColumnDef::new(ChannelAccount::Config).json())
                    .col(ColumnDef::new(ChannelAccount::Weight).integer().not_null().default(10))
                    .col(ColumnDef::new(ChannelAccount::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(ChannelAccount::CurrentTasks)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChannelAccount::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChannelAccount::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_account_channel_id")
                    .table(ChannelAccount::Table)
                    .col(ChannelAccount::ChannelId)
                    .to_owned(),
            )
            .await?;

        // 创建能力表
        manager
            .create_table(
                Table::create()
                    .table(Capability::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Capability::Code)
                            .string_len(30)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Capability::Name).string_len(50).not_null())
                    .col(ColumnDef::new(Capability::Type).string_len(10).not_null().default("image"))
                    .col(ColumnDef::new(Capability::Description).text().not_null().default(""))
                    .col(ColumnDef::new(Capability::StandardParams).json())
                    .col(ColumnDef::new(Capability::StandardResponse).json())
                    .col(ColumnDef::new(Capability::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(Capability::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Capability::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建渠道能力配置表
        manager
            .create_table(
                Table::create()
                    .table(ChannelCapability::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelCapability::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChannelCapability::ChannelId).integer().not_null())
                    .col(
                        ColumnDef::new(ChannelCapability::CapabilityCode)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChannelCapability::Model).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(ChannelCapability::Name).string_len(100).not_null().default(""))
                    .col(ColumnDef::new(ChannelCapability::Price).double().not_null().default(0))
                    .col(
                        ColumnDef::new(ChannelCapability::PriceUnit)
                            .string_len(20)
                            .not_null()
                            .default("request"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::ResultMode)
                            .string_len(10)
                            .not_null()
                            .default("poll"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::RequestPath)
                            .string_len(255)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::RequestMethod)
                            .string_len(10)
                            .not_null()
                            .default("POST"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::ContentType)
                            .string_len(50)
                            .not_null()
                            .default("application/json"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::AuthLocation)
                            .string_len(10)
                            .not_null()
                            .default("header"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::AuthKey)
                            .string_len(50)
                            .not_null()
                            .default("Authorization"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::AuthValuePrefix)
                            .string_len(30)
                            .not_null()
                            .default("Bearer "),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::PollPath)
                            .string_len(255)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::PollMethod)
                            .string_len(10)
                            .not_null()
                            .default("GET"),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::PollInterval)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::PollMaxAttempts)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(ColumnDef::new(ChannelCapability::PollParamMapping).json())
                    .col(ColumnDef::new(ChannelCapability::PollResponseMapping).json())
                    .col(ColumnDef::new(ChannelCapability::ParamMapping).json())
                    .col(ColumnDef::new(ChannelCapability::ResponseMapping).json())
                    .col(ColumnDef::new(ChannelCapability::CallbackMapping).json())
                    .col(ColumnDef::new(ChannelCapability::ExtraConfig).json())
                    .col(ColumnDef::new(ChannelCapability::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(ChannelCapability::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChannelCapability::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_capability_channel_id")
                    .table(ChannelCapability::Table)
                    .col(ChannelCapability::ChannelId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_capability_code_status")
                    .table(ChannelCapability::Table)
                    .col(ChannelCapability::CapabilityCode)
                    .col(ChannelCapability::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_channel_capability_code_status")
                    .table(ChannelCapability::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_channel_capability_channel_id")
                    .table(ChannelCapability::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_channel_account_channel_id")
                    .table(ChannelAccount::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ChannelCapability::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Capability::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChannelAccount::Table).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(Channel::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Channel {
    Table,
    Id,
    Type,
    Name,
    BaseUrl,
    Config,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ChannelAccount {
    Table,
    Id,
    ChannelId,
    Name,
    ApiKey,
    Config,
    Weight,
    Status,
    CurrentTasks,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Capability {
    Table,
    Code,
    Name,
    Type,
    Description,
    StandardParams,
    StandardResponse,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ChannelCapability {
    Table,
    Id,
    ChannelId,
    CapabilityCode,
    Model,
    Name,
    Price,
    PriceUnit,
    ResultMode,
    RequestPath,
    RequestMethod,
    ContentType,
    AuthLocation,
    AuthKey,
    AuthValuePrefix,
    PollPath,
    PollMethod,
    PollInterval,
    PollMaxAttempts,
    PollParamMapping,
    PollResponseMapping,
    ParamMapping,
    ResponseMapping,
    CallbackMapping,
    ExtraConfig,
    Status,
    CreatedAt,
    UpdatedAt,
}
