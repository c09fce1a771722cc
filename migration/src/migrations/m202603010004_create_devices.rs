use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010004_create_devices"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("devices"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).string().not_null().primary_key())
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("location")).string().not_null())
                    .col(ColumnDef::new(Alias::new("current_address")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("state"))
                            .enumeration(
                                Alias::new("device_state"),
                                vec![
                                    Alias::new("online"),
                                    Alias::new("offline"),
                                    Alias::new("syncing"),
                                    Alias::new("error"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("model")).string().null())
                    .col(ColumnDef::new(Alias::new("firmware_version")).string().null())
                    .col(ColumnDef::new(Alias::new("capacity")).integer().not_null().default(127))
                    .col(ColumnDef::new(Alias::new("last_contact")).timestamp().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("devices")).to_owned())
            .await
    }
}
