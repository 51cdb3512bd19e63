// src/database.rs
use crate::errors::{GradingError, Result};
use crate::models::{Batch, BatchStatus, Grade, GradingRubric, NewGrade, NewRubric};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Row, SqlitePool};
use std::path::PathBuf;

/// Persistence operations the grading service needs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_rubric(&self, rubric: NewRubric) -> Result<GradingRubric>;
    async fn get_rubric(&self, id: &str) -> Result<Option<GradingRubric>>;

    async fn create_batch(
        &self,
        user_id: &str,
        name: &str,
        rubric_id: &str,
        file_urls: &[String],
    ) -> Result<Batch>;
    async fn get_batch(&self, id: &str) -> Result<Option<Batch>>;
    /// Only the file list and status of a batch ever change.
    async fn update_batch(&self, id: &str, file_urls: &[String], status: BatchStatus) -> Result<()>;

    async fn create_grade(&self, grade: NewGrade) -> Result<Grade>;
    async fn get_grade(&self, id: &str) -> Result<Option<Grade>>;
    async fn list_batch_grades(&self, batch_id: &str) -> Result<Vec<Grade>>;
}

/// Opens the database named by `database_url` (or the default location) and
/// runs migrations.
pub async fn init_db(database_url: Option<&str>) -> Result<SqlitePool> {
    let db_path = get_db_path(database_url)?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
        log::info!("✅ Database directory ready: {}", parent.display());
    }

    let absolute_path = if db_path.is_relative() {
        std::env::current_dir()?.join(&db_path)
    } else {
        db_path
    };

    let db_url = format!("sqlite://{}?mode=rwc", absolute_path.display());
    log::info!("📦 Connecting to: {}", db_url);

    connect(&db_url, 5).await
}

/// Connects to `db_url` and brings the schema up to date.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| GradingError::Database(e.into()))?;

    log::info!("✅ Database migrations completed");
    Ok(pool)
}

fn get_db_path(database_url: Option<&str>) -> Result<PathBuf> {
    match database_url {
        Some(url) => {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .ok_or_else(|| GradingError::Config("DATABASE_URL must start with 'sqlite:'".into()))?;
            Ok(PathBuf::from(path))
        }
        None => {
            let base = dirs::data_local_dir()
                .ok_or_else(|| GradingError::Config("no data directory; set DATABASE_URL".into()))?;
            Ok(base.join("essay-grader").join("grader.db"))
        }
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fresh private in-memory database, mostly for tests and local tooling.
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(connect("sqlite::memory:", 1).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn rubric_from_row(row: &SqliteRow) -> Result<GradingRubric> {
    let criteria: String = row.get(3);
    Ok(GradingRubric {
        id: row.get(0),
        user_id: row.get(1),
        title: row.get(2),
        criteria: serde_json::from_str(&criteria)?,
        total_points: row.get(4),
        created_at: row.get(5),
    })
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let file_urls: String = row.get(4);
    let status: String = row.get(5);
    Ok(Batch {
        id: row.get(0),
        user_id: row.get(1),
        name: row.get(2),
        rubric_id: row.get(3),
        file_urls: serde_json::from_str(&file_urls)?,
        status: status.parse()?,
        overall_feedback: row.get(6),
        created_at: row.get(7),
    })
}

fn grade_from_row(row: &SqliteRow) -> Grade {
    Grade {
        id: row.get(0),
        user_id: row.get(1),
        rubric_id: row.get(2),
        batch_id: row.get(3),
        file_name: row.get(4),
        file_url: row.get(5),
        score: row.get(6),
        feedback: row.get(7),
        rubric_data: row.get(8),
        created_at: row.get(9),
    }
}

const GRADE_COLUMNS: &str =
    "id, user_id, rubric_id, batch_id, file_name, file_url, score, feedback, rubric_data, created_at";

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_rubric(&self, rubric: NewRubric) -> Result<GradingRubric> {
        let total_points = rubric.validate()?;
        let created = GradingRubric {
            id: new_id(),
            user_id: rubric.user_id,
            title: rubric.title,
            criteria: rubric.criteria,
            total_points,
            created_at: now(),
        };

        sqlx::query(
            r#"
            INSERT INTO rubrics (id, user_id, title, criteria, total_points, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&created.id)
        .bind(&created.user_id)
        .bind(&created.title)
        .bind(serde_json::to_string(&created.criteria)?)
        .bind(created.total_points)
        .bind(&created.created_at)
        .execute(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_rubric(&self, id: &str) -> Result<Option<GradingRubric>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, criteria, total_points, created_at FROM rubrics WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(rubric_from_row).transpose()
    }

    async fn create_batch(
        &self,
        user_id: &str,
        name: &str,
        rubric_id: &str,
        file_urls: &[String],
    ) -> Result<Batch> {
        let batch = Batch {
            id: new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            rubric_id: rubric_id.to_string(),
            file_urls: file_urls.to_vec(),
            status: BatchStatus::Pending,
            overall_feedback: None,
            created_at: now(),
        };

        sqlx::query(
            r#"
            INSERT INTO batches (id, user_id, name, rubric_id, file_urls, status, overall_feedback, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.user_id)
        .bind(&batch.name)
        .bind(&batch.rubric_id)
        .bind(serde_json::to_string(&batch.file_urls)?)
        .bind(batch.status.as_str())
        .bind(&batch.overall_feedback)
        .bind(&batch.created_at)
        .execute(&self.pool)
        .await?;

        Ok(batch)
    }

    async fn get_batch(&self, id: &str) -> Result<Option<Batch>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, rubric_id, file_urls, status, overall_feedback, created_at
            FROM batches WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(batch_from_row).transpose()
    }

    async fn update_batch(&self, id: &str, file_urls: &[String], status: BatchStatus) -> Result<()> {
        let result = sqlx::query("UPDATE batches SET file_urls = ?, status = ? WHERE id = ?")
            .bind(serde_json::to_string(file_urls)?)
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GradingError::BatchNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_grade(&self, grade: NewGrade) -> Result<Grade> {
        let created = Grade {
            id: new_id(),
            user_id: grade.user_id,
            rubric_id: grade.rubric_id,
            batch_id: grade.batch_id,
            file_name: grade.file_name,
            file_url: grade.file_url,
            score: grade.score,
            feedback: grade.feedback,
            rubric_data: grade.rubric_data,
            created_at: now(),
        };

        sqlx::query(&format!(
            "INSERT INTO grades ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            GRADE_COLUMNS
        ))
        .bind(&created.id)
        .bind(&created.user_id)
        .bind(&created.rubric_id)
        .bind(&created.batch_id)
        .bind(&created.file_name)
        .bind(&created.file_url)
        .bind(&created.score)
        .bind(&created.feedback)
        .bind(&created.rubric_data)
        .bind(&created.created_at)
        .execute(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_grade(&self, id: &str) -> Result<Option<Grade>> {
        let row = sqlx::query(&format!("SELECT {} FROM grades WHERE id = ?", GRADE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(grade_from_row))
    }

    async fn list_batch_grades(&self, batch_id: &str) -> Result<Vec<Grade>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM grades WHERE batch_id = ? ORDER BY created_at ASC",
            GRADE_COLUMNS
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(grade_from_row).collect())
    }
}
