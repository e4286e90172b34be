use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_orders_table::Migration),
            Box::new(m20240601_000002_create_payment_instruments_table::Migration),
        ]
    }
}

mod m20240601_000001_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::OrderNo)
                                .string_len(64)
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(16)
                                .not_null()
                                .default("created"),
                        )
                        .col(
                            ColumnDef::new(Orders::ExportStatus)
                                .string_len(16)
                                .not_null()
                                .default("not_exported"),
                        )
                        .col(ColumnDef::new(Orders::AmountValue).big_integer().not_null())
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::CountryCode).string_len(2).null())
                        .col(ColumnDef::new(Orders::PspReference).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_payment_status")
                        .table(Orders::Table)
                        .col(Orders::PaymentStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Orders {
        Table,
        OrderNo,
        PaymentStatus,
        ExportStatus,
        AmountValue,
        Currency,
        CountryCode,
        PspReference,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_payment_instruments_table {

    use super::m20240601_000001_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_payment_instruments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentInstruments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentInstruments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentInstruments::OrderNo)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentInstruments::PaymentMethod)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentInstruments::PaymentMethodType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentInstruments::PaymentData).text().null())
                        .col(ColumnDef::new(PaymentInstruments::Md).text().null())
                        .col(ColumnDef::new(PaymentInstruments::PspReference).string().null())
                        .col(ColumnDef::new(PaymentInstruments::AuthResult).string().null())
                        .col(
                            ColumnDef::new(PaymentInstruments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentInstruments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_instruments_order")
                                .from(PaymentInstruments::Table, PaymentInstruments::OrderNo)
                                .to(Orders::Table, Orders::OrderNo)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_instruments_order_no")
                        .table(PaymentInstruments::Table)
                        .col(PaymentInstruments::OrderNo)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentInstruments::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum PaymentInstruments {
        Table,
        Id,
        OrderNo,
        PaymentMethod,
        PaymentMethodType,
        PaymentData,
        Md,
        PspReference,
        AuthResult,
        CreatedAt,
        UpdatedAt,
    }
}
