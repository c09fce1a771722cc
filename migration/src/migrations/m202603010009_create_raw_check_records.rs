use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010009_create_raw_check_records"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("raw_check_records"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("user_id")).big_integer().not_null())
                    .col(
                        ColumnDef::new(Alias::new("direction"))
                            .enumeration(
                                Alias::new("check_direction"),
                                vec![Alias::new("ingress"), Alias::new("egress")],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("recorded_at")).timestamp().not_null())
                    .col(ColumnDef::new(Alias::new("origin_device")).string().null())
                    .col(ColumnDef::new(Alias::new("manual_origin")).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("raw_check_records"), Alias::new("user_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raw_check_records_user_time")
                    .table(Alias::new("raw_check_records"))
                    .col(Alias::new("user_id"))
                    .col(Alias::new("recorded_at"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("raw_check_records")).to_owned())
            .await
    }
}
