use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202603010006_create_device_slot_assignments"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("device_slot_assignments"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("template_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("device_id")).string().not_null())
                    .col(ColumnDef::new(Alias::new("local_slot")).integer().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .enumeration(
                                Alias::new("assignment_status"),
                                vec![
                                    Alias::new("pending"),
                                    Alias::new("synced"),
                                    Alias::new("removal_pending"),
                                    Alias::new("removed"),
                                ],
                            )
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("last_synced_at")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("sync_attempts")).integer().not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("device_slot_assignments"), Alias::new("template_id"))
                            .to(Alias::new("fingerprint_templates"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("device_slot_assignments"), Alias::new("device_id"))
                            .to(Alias::new("devices"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Slot uniqueness among live rows is enforced by the allocator under
        // the per-device lock; this index just keeps lookups cheap.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_slot_assignments_device_slot")
                    .table(Alias::new("device_slot_assignments"))
                    .col(Alias::new("device_id"))
                    .col(Alias::new("local_slot"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("device_slot_assignments")).to_owned())
            .await
    }
}
