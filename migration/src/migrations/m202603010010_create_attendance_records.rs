use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010010_create_attendance_records"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendance_records"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("user_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("class_session_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("date")).date().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .enumeration(
                                Alias::new("attendance_status"),
                                vec![
                                    Alias::new("present"),
                                    Alias::new("absent"),
                                    Alias::new("late"),
                                    Alias::new("excused"),
                                    Alias::new("incomplete"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("check_in")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("check_out")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("lunch_out")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("lunch_in")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("minutes_late")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("auto_computed")).boolean().not_null().default(true))
                    .col(ColumnDef::new(Alias::new("notes")).string().null())
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("attendance_records"), Alias::new("user_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("attendance_records"), Alias::new("class_session_id"))
                            .to(Alias::new("class_sessions"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_attendance_user_session_date")
                    .table(Alias::new("attendance_records"))
                    .col(Alias::new("user_id"))
                    .col(Alias::new("class_session_id"))
                    .col(Alias::new("date"))
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("attendance_records")).to_owned())
            .await
    }
}
