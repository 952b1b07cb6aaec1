//! Read side of the shop catalog: products and their media assets

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::{MediaAsset, Platform, Product};

fn product_from_row(r: &SqliteRow) -> Product {
    Product {
        id: r.get("id"),
        name: r.get("name"),
        category: r.get("category"),
        slug: r.get("slug"),
        image_url: r.get("image_url"),
        active: r.get::<bool, _>("active"),
    }
}

fn asset_from_row(r: &SqliteRow) -> MediaAsset {
    MediaAsset {
        id: r.get("id"),
        product_id: r.get("product_id"),
        original_url: r.get("original_url"),
    }
}

impl Database {
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, category, slug, image_url, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                slug = excluded.slug,
                image_url = excluded.image_url,
                active = excluded.active
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.slug)
        .bind(&product.image_url)
        .bind(product.active)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Attach an asset to a product; assets are ordered by insertion
    pub async fn insert_asset(&self, asset: &MediaAsset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media_assets (id, product_id, original_url, position, created_at)
            VALUES (?, ?, ?,
                    (SELECT COUNT(*) FROM media_assets WHERE product_id = ?),
                    ?)
            "#,
        )
        .bind(&asset.id)
        .bind(&asset.product_id)
        .bind(&asset.original_url)
        .bind(&asset.product_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, category, slug, image_url, active FROM products WHERE id = ?",
        )
        .bind(product_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(product_from_row))
    }

    pub async fn get_asset(&self, asset_id: &str) -> Result<Option<MediaAsset>> {
        let row = sqlx::query("SELECT id, product_id, original_url FROM media_assets WHERE id = ?")
            .bind(asset_id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(asset_from_row))
    }

    /// First asset uploaded for a product
    pub async fn primary_asset(&self, product_id: &str) -> Result<Option<MediaAsset>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, original_url FROM media_assets
            WHERE product_id = ?
            ORDER BY position ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(asset_from_row))
    }

    /// Active products that have something to show, least recently scheduled
    /// on `platform` first
    pub async fn eligible_products(
        &self,
        platform: Platform,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.category, p.slug, p.image_url, p.active,
                   (SELECT MAX(s.scheduled_for) FROM scheduled_posts s
                    WHERE s.product_id = p.id AND s.platform = ?) AS last_scheduled
            FROM products p
            WHERE p.active = 1
              AND (p.image_url IS NOT NULL
                   OR EXISTS (SELECT 1 FROM media_assets a WHERE a.product_id = p.id))
            ORDER BY last_scheduled IS NOT NULL, last_scheduled ASC, p.created_at ASC, p.id ASC
            LIMIT ?
            "#,
        )
        .bind(platform.as_str())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(product_from_row).collect())
    }
}
