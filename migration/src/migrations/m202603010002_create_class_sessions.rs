use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010002_create_class_sessions"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("class_sessions"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("course_division_id")).big_integer().not_null())
                    .col(
                        ColumnDef::new(Alias::new("weekday"))
                            .enumeration(
                                Alias::new("weekday"),
                                vec![
                                    Alias::new("monday"),
                                    Alias::new("tuesday"),
                                    Alias::new("wednesday"),
                                    Alias::new("thursday"),
                                    Alias::new("friday"),
                                    Alias::new("saturday"),
                                    Alias::new("sunday"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("starts_at")).time().not_null())
                    .col(ColumnDef::new(Alias::new("ends_at")).time().not_null())
                    .col(ColumnDef::new(Alias::new("subject")).string().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("class_sessions")).to_owned())
            .await
    }
}
