use crate::entities::{images, prelude::*};
use async_trait::async_trait;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct UserStats {
    pub image_count: i64,
    pub total_size: i64,
}

/// Relational store of image records. The saga and the reconciliation
/// engine only talk to this trait, so partial-failure paths can be
/// exercised with a stub.
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Insert one record. The unique constraint on `storage_key` is
    /// the backstop against double-cataloguing a blob.
    async fn insert_image(&self, image: images::Model) -> Result<images::Model, DbErr>;
    async fn find_by_id(&self, id: &str) -> Result<Option<images::Model>, DbErr>;
    async fn find_by_storage_key(&self, storage_key: &str)
    -> Result<Option<images::Model>, DbErr>;
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<images::Model>, DbErr>;
    async fn delete_image(&self, id: &str) -> Result<(), DbErr>;
    async fn user_stats(&self, user_id: &str) -> Result<UserStats, DbErr>;
}

pub struct SeaOrmCatalog {
    db: DatabaseConnection,
}

impl SeaOrmCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageCatalog for SeaOrmCatalog {
    async fn insert_image(&self, image: images::Model) -> Result<images::Model, DbErr> {
        image.into_active_model().insert(&self.db).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<images::Model>, DbErr> {
        Images::find_by_id(id).one(&self.db).await
    }

    async fn find_by_storage_key(
        &self,
        storage_key: &str,
    ) -> Result<Option<images::Model>, DbErr> {
        Images::find()
            .filter(images::Column::StorageKey.eq(storage_key))
            .one(&self.db)
            .await
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<images::Model>, DbErr> {
        Images::find()
            .filter(images::Column::UserId.eq(user_id))
            .order_by_desc(images::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await
    }

    async fn delete_image(&self, id: &str) -> Result<(), DbErr> {
        Images::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn user_stats(&self, user_id: &str) -> Result<UserStats, DbErr> {
        // CAST keeps the sum a bigint on Postgres, where SUM over
        // bigint otherwise widens to numeric.
        let row: Option<(i64, i64)> = Images::find()
            .select_only()
            .column_as(Expr::cust("COUNT(*)"), "image_count")
            .column_as(
                Expr::cust("CAST(COALESCE(SUM(file_size), 0) AS BIGINT)"),
                "total_size",
            )
            .filter(images::Column::UserId.eq(user_id))
            .into_tuple()
            .one(&self.db)
            .await?;

        let (image_count, total_size) = row.unwrap_or((0, 0));
        Ok(UserStats {
            image_count,
            total_size,
        })
    }
}
