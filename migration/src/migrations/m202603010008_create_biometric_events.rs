use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010008_create_biometric_events"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("biometric_events"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("device_id")).string().not_null())
                    .col(ColumnDef::new(Alias::new("user_id")).big_integer().null())
                    .col(
                        ColumnDef::new(Alias::new("event_type"))
                            .enumeration(
                                Alias::new("biometric_event_type"),
                                vec![
                                    Alias::new("auth"),
                                    Alias::new("attendance"),
                                    Alias::new("enrollment"),
                                    Alias::new("error"),
                                    Alias::new("heartbeat"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("result"))
                            .enumeration(
                                Alias::new("biometric_event_result"),
                                vec![
                                    Alias::new("success"),
                                    Alias::new("failure"),
                                    Alias::new("unknown"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("confidence")).integer().null())
                    .col(ColumnDef::new(Alias::new("security_flagged")).boolean().not_null().default(false))
                    .col(ColumnDef::new(Alias::new("device_timestamp")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("server_timestamp")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("biometric_events"), Alias::new("device_id"))
                            .to(Alias::new("devices"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("biometric_events")).to_owned())
            .await
    }
}
