//! Database layer
//!
//! The marketplace runs on SQLite (default, single file) or MySQL. Callers
//! hold a `DynDatabasePool` and never name the backend; repositories branch
//! on `DatabasePool::driver()` and reach the concrete sqlx pool through
//! `sqlite()` / `mysql()`.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
