use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_products_table::Migration),
            Box::new(m20250101_000002_create_orders_tables::Migration),
            Box::new(m20250101_000003_create_coupons_tables::Migration),
            Box::new(m20250101_000004_create_payments_table::Migration),
        ]
    }
}

mod m20250101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Brand).string().null())
                        .col(ColumnDef::new(Products::Category).string().null())
                        .col(ColumnDef::new(Products::Image).string().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::DiscountPercentage)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::Stock).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Brand,
        Category,
        Image,
        Price,
        DiscountPercentage,
        Stock,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_orders_tables"
        }
    }

    fn money(col: Orders) -> ColumnDef {
        ColumnDef::new(col)
            .decimal()
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingCountry).string().not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(money(Orders::Subtotal))
                        .col(money(Orders::DiscountAmount))
                        .col(money(Orders::ShippingCost))
                        .col(money(Orders::TaxAmount))
                        .col(money(Orders::TotalAmount))
                        .col(ColumnDef::new(Orders::PaymentReference).string().null())
                        .col(
                            ColumnDef::new(Orders::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::CancellationReason).string().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
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
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Image).string().null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(OrderItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Orders {
        Table,
        Id,
        UserId,
        Status,
        ShippingAddress,
        ShippingCity,
        ShippingPostalCode,
        ShippingCountry,
        CouponCode,
        Subtotal,
        DiscountAmount,
        ShippingCost,
        TaxAmount,
        TotalAmount,
        PaymentReference,
        PaidAt,
        DeliveredAt,
        CancelledAt,
        CancellationReason,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Name,
        Image,
        Quantity,
        UnitPrice,
    }
}

mod m20250101_000003_create_coupons_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_coupons_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::Description).string().null())
                        .col(ColumnDef::new(Coupons::DiscountType).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Coupons::DiscountValue)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinOrderAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::MaxDiscountAmount)
                                .decimal()
                                .null(),
                        )
                        .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(Coupons::UsedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::PerUserLimit)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Coupons::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Coupons::ApplicableCategories).text().null())
                        .col(ColumnDef::new(Coupons::ApplicableProducts).text().null())
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponRedemptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponRedemptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponRedemptions::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponRedemptions::UserId).uuid().not_null())
                        .col(ColumnDef::new(CouponRedemptions::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(CouponRedemptions::UsedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_redemptions_coupon_id")
                                .from(CouponRedemptions::Table, CouponRedemptions::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_redemptions_coupon_user")
                        .table(CouponRedemptions::Table)
                        .col(CouponRedemptions::CouponId)
                        .col(CouponRedemptions::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_coupon_redemptions_coupon_order")
                        .table(CouponRedemptions::Table)
                        .col(CouponRedemptions::CouponId)
                        .col(CouponRedemptions::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponRedemptions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        DiscountValue,
        MinOrderAmount,
        MaxDiscountAmount,
        UsageLimit,
        UsedCount,
        PerUserLimit,
        ValidFrom,
        ValidUntil,
        IsActive,
        ApplicableCategories,
        ApplicableProducts,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CouponRedemptions {
        Table,
        Id,
        CouponId,
        UserId,
        OrderId,
        UsedAt,
    }
}

mod m20250101_000004_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Payments::PaymentIntentId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Payments::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Payments::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Payments::PaymentMethod).string().null())
                        .col(ColumnDef::new(Payments::ReceiptUrl).string().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
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
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        PaymentIntentId,
        OrderId,
        UserId,
        Amount,
        Currency,
        Status,
        PaymentMethod,
        ReceiptUrl,
        CreatedAt,
        UpdatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig};

    #[tokio::test]
    async fn migrations_apply_and_revert_on_sqlite() {
        let db = establish_connection_with_config(&DbConfig::sqlite_memory())
            .await
            .unwrap();

        Migrator::up(&db, None).await.unwrap();
        assert_eq!(Migrator::get_applied_migrations(&db).await.unwrap().len(), 4);

        Migrator::down(&db, None).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        assert!(Migrator::get_pending_migrations(&db).await.unwrap().is_empty());
    }
}
