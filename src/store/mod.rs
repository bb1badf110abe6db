use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

const CREATE_TODOS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS todos (
    ID TEXT PRIMARY KEY,
    Title TEXT NOT NULL,
    Completed BOOLEAN NOT NULL,
    OwnerID TEXT NOT NULL
)";

/// A to-do record. Field names on the wire (and in the table) are the
/// capitalized forms the existing clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Todo {
    #[serde(rename = "ID")]
    #[sqlx(rename = "ID")]
    pub id: String,
    #[serde(rename = "OwnerID")]
    #[sqlx(rename = "OwnerID")]
    pub owner_id: String,
    #[serde(rename = "Title")]
    #[sqlx(rename = "Title")]
    pub title: String,
    #[serde(rename = "Completed")]
    #[sqlx(rename = "Completed")]
    pub completed: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Single-table persistent store for to-do records.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the SQLite database at `database_path` and
    /// make sure the todos table exists.
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_todos_table().await?;
        Ok(store)
    }

    /// Ephemeral in-memory store, used by tests and demos.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        // a single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_todos_table().await?;
        Ok(store)
    }

    async fn create_todos_table(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TODOS_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_todos(&self) -> Result<Vec<Todo>, StoreError> {
        let todos = sqlx::query_as::<_, Todo>("SELECT ID, OwnerID, Title, Completed FROM todos")
            .fetch_all(&self.pool)
            .await?;
        Ok(todos)
    }

    pub async fn get_todo(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        let todo = sqlx::query_as::<_, Todo>(
            "SELECT ID, OwnerID, Title, Completed FROM todos WHERE ID = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(todo)
    }

    pub async fn insert_todo(&self, todo: &Todo) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO todos (ID, OwnerID, Title, Completed) VALUES (?1, ?2, ?3, ?4)")
            .bind(&todo.id)
            .bind(&todo.owner_id)
            .bind(&todo.title)
            .bind(todo.completed)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_todo(&self, todo: &Todo) -> Result<(), StoreError> {
        sqlx::query("UPDATE todos SET Title = ?1, Completed = ?2 WHERE ID = ?3")
            .bind(&todo.title)
            .bind(todo.completed)
            .bind(&todo.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_todo(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM todos WHERE ID = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
