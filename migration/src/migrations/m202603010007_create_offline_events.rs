use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010007_create_offline_events"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("offline_events"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("device_id")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("operation_type"))
                            .enumeration(
                                Alias::new("offline_operation_type"),
                                vec![
                                    Alias::new("enroll"),
                                    Alias::new("delete"),
                                    Alias::new("biometric_event"),
                                    Alias::new("status_update"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("payload")).text().not_null())
                    .col(ColumnDef::new(Alias::new("attempt_count")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("permanently_failed")).boolean().not_null().default(false))
                    .col(ColumnDef::new(Alias::new("enqueued_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("offline_events"), Alias::new("device_id"))
                            .to(Alias::new("devices"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("offline_events")).to_owned())
            .await
    }
}
