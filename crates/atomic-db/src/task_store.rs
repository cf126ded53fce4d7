//! Queries against the `tasks` table.
//!
//! The task list is the data the HTTP pipeline serves. It is deliberately
//! small; the harness only needs something real to write and roll back.
//!
//! Queries are built at runtime and parameterized with `$N` placeholders,
//! which both `SQLite` and `PostgreSQL` accept through the `Any` driver.
//! `completed` is stored as an integer so the same row mapping works on
//! both backends.

use sqlx::AnyConnection;

use crate::error::StoreError;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TaskRow {
    /// Primary key.
    pub id: i64,
    /// Task title.
    pub title: String,
    /// `1` when the task is done, `0` otherwise.
    pub completed: i64,
}

impl TaskRow {
    /// Whether the task is done.
    pub const fn is_completed(&self) -> bool {
        self.completed != 0
    }
}

/// Operations on the `tasks` table over one acquired connection.
pub struct TaskStore<'a> {
    conn: &'a mut AnyConnection,
}

impl<'a> TaskStore<'a> {
    /// Create a task store bound to a connection.
    pub const fn new(conn: &'a mut AnyConnection) -> Self {
        Self { conn }
    }

    /// Create the `tasks` table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the DDL fails.
    pub async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let ddl = if self.conn.backend_name().eq_ignore_ascii_case("postgresql") {
            r"CREATE TABLE IF NOT EXISTS tasks (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                completed BIGINT NOT NULL DEFAULT 0
              )"
        } else {
            r"CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0
              )"
        };

        sqlx::query(ddl).execute(&mut *self.conn).await?;
        tracing::debug!(backend = self.conn.backend_name(), "Ensured tasks schema");
        Ok(())
    }

    /// All tasks ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list(&mut self) -> Result<Vec<TaskRow>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, title, completed FROM tasks ORDER BY id",
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    /// Fetch a single task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no task has that id.
    pub async fn get(&mut self, id: i64) -> Result<TaskRow, StoreError> {
        sqlx::query_as::<_, TaskRow>("SELECT id, title, completed FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    /// Insert a task and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn create(&mut self, title: &str, completed: bool) -> Result<TaskRow, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            "INSERT INTO tasks (title, completed) VALUES ($1, $2) RETURNING id, title, completed",
        )
        .bind(title)
        .bind(i64::from(completed))
        .fetch_one(&mut *self.conn)
        .await?;

        tracing::debug!(task_id = row.id, "Inserted task");
        Ok(row)
    }

    /// Overwrite a task's title and completion flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no task has that id.
    pub async fn update(
        &mut self,
        id: i64,
        title: &str,
        completed: bool,
    ) -> Result<TaskRow, StoreError> {
        sqlx::query_as::<_, TaskRow>(
            "UPDATE tasks SET title = $1, completed = $2 WHERE id = $3 RETURNING id, title, completed",
        )
        .bind(title)
        .bind(i64::from(completed))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    /// Delete a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no task has that id.
    pub async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Number of tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count(&mut self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}
