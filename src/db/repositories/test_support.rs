//! Fixtures shared by repository and service tests

use chrono::Utc;
use sqlx::Row;

use super::fold_case;
use crate::db::{create_test_pool, migrations, DynDatabasePool};

/// Fresh in-memory database with the full schema
pub async fn setup_pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Insert a user with a complete profile; returns the id.
pub async fn insert_user(pool: &DynDatabasePool, name: &str) -> i64 {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (username, email, password_hash, telegram_username, phone, location, \
         email_verified, created_at, updated_at) VALUES (?, ?, 'hash', ?, '0911000000', 'Adama', 0, ?, ?)",
    )
    .bind(name)
    .bind(format!("{}@example.com", name))
    .bind(format!("@{}", name))
    .bind(now)
    .bind(now)
    .execute(pool.as_sqlite().unwrap())
    .await
    .expect("Failed to insert user")
    .last_insert_rowid()
}

/// Insert a category with one subcategory; returns both ids.
pub async fn insert_taxonomy(pool: &DynDatabasePool, category: &str, subcategory: &str) -> (i64, i64) {
    let sqlite = pool.as_sqlite().unwrap();
    let now = Utc::now();
    let existing = sqlx::query("SELECT id FROM categories WHERE name = ?")
        .bind(category)
        .fetch_optional(sqlite)
        .await
        .unwrap();
    let category_id = match existing {
        Some(row) => row.get("id"),
        None => sqlx::query("INSERT INTO categories (name, name_folded, slug, icon, created_at) VALUES (?, ?, ?, 'tag', ?)")
            .bind(category)
            .bind(fold_case(category))
            .bind(crate::models::taxonomy_slug(category))
            .bind(now)
            .execute(sqlite)
            .await
            .expect("Failed to insert category")
            .last_insert_rowid(),
    };
    let subcategory_id = sqlx::query(
        "INSERT INTO subcategories (category_id, name, name_folded, slug, icon, created_at) \
         VALUES (?, ?, ?, ?, 'tag', ?)",
    )
    .bind(category_id)
    .bind(subcategory)
    .bind(fold_case(subcategory))
    .bind(crate::models::taxonomy_slug(subcategory))
    .bind(now)
    .execute(sqlite)
    .await
    .expect("Failed to insert subcategory")
    .last_insert_rowid();
    (category_id, subcategory_id)
}

/// Insert an available listing priced in cents; returns the id.
pub async fn insert_listing(
    pool: &DynDatabasePool,
    seller_id: i64,
    category_id: i64,
    subcategory_id: i64,
    title: &str,
    price_cents: i64,
) -> i64 {
    let now = Utc::now();
    let description = format!("{} in good shape", title);
    sqlx::query(
        "INSERT INTO listings (title, description, title_folded, description_folded, price_cents, \
         category_id, subcategory_id, item_condition, location, location_folded, contact_telegram, \
         status, view_count, seller_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'used', 'Adama', 'adama', '@seller', 'available', 0, ?, ?, ?)",
    )
    .bind(title)
    .bind(&description)
    .bind(fold_case(title))
    .bind(fold_case(&description))
    .bind(price_cents)
    .bind(category_id)
    .bind(subcategory_id)
    .bind(seller_id)
    .bind(now)
    .bind(now)
    .execute(pool.as_sqlite().unwrap())
    .await
    .expect("Failed to insert listing")
    .last_insert_rowid()
}
