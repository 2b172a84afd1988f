use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool};

use super::filter::{escape_like, PostFilter};
use super::models::{NewPost, Page, PostChanges, PostRecord};

const POST_COLUMNS: &str = "id, title, link, description, pub_date, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("a post with link {0} already exists")]
    DuplicateLink(String),
}

impl StorageError {
    fn from_write(error: sqlx::Error, link: Option<&str>) -> Self {
        match (&error, link) {
            (sqlx::Error::Database(db_error), Some(link)) if db_error.is_unique_violation() => {
                StorageError::DuplicateLink(link.to_string())
            }
            _ => StorageError::Database(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostRepository {
    pool: SqlitePool,
}

impl PostRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn find(&self, id: i64) -> Result<Option<PostRecord>, StorageError> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
        let row = sqlx::query_as::<_, PostRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Runs the filter as one count query and one page query.
    pub async fn list(&self, filter: &PostFilter) -> Result<Page<PostRecord>, StorageError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        push_conditions(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        push_conditions(&mut select, filter);
        select.push(" ORDER BY ");
        if let Some(sort) = filter.sort {
            select.push(sort.field.column());
            select.push(" ");
            select.push(sort.order.keyword());
            select.push(", ");
        }
        select.push("id ASC LIMIT ");
        select.push_bind(i64::from(filter.per_page));
        select.push(" OFFSET ");
        select.push_bind(filter.offset());

        let rows = select
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::new(
            rows,
            filter.page,
            filter.per_page,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    pub async fn create(&self, post: &NewPost) -> Result<PostRecord, StorageError> {
        let query = format!(
            r#"
            INSERT INTO posts (title, link, description, pub_date)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING {POST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PostRecord>(&query)
            .bind(&post.title)
            .bind(&post.link)
            .bind(&post.description)
            .bind(&post.pub_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| StorageError::from_write(error, Some(&post.link)))
    }

    /// Applies the present fields and bumps `updated_at`. `Ok(None)` when the
    /// id does not exist.
    pub async fn update(
        &self,
        id: i64,
        changes: &PostChanges,
    ) -> Result<Option<PostRecord>, StorageError> {
        let (set_description, description) = match &changes.description {
            Some(value) => (true, value.clone()),
            None => (false, None),
        };
        let query = format!(
            r#"
            UPDATE posts
            SET title = COALESCE(?1, title),
                link = COALESCE(?2, link),
                description = CASE WHEN ?3 THEN ?4 ELSE description END,
                pub_date = COALESCE(?5, pub_date),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?6
            RETURNING {POST_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PostRecord>(&query)
            .bind(&changes.title)
            .bind(&changes.link)
            .bind(set_description)
            .bind(description)
            .bind(&changes.pub_date)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StorageError::from_write(error, changes.link.as_deref()))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let affected = sqlx::query("DELETE FROM posts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Inserts every post whose link is not stored yet, in one transaction.
    /// Returns how many rows were actually inserted.
    pub async fn insert_new(&self, posts: &[NewPost]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0_usize;
        for post in posts {
            let affected = sqlx::query(
                r#"
                INSERT INTO posts (title, link, description, pub_date)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(link) DO NOTHING
                "#,
            )
            .bind(&post.title)
            .bind(&post.link)
            .bind(&post.description)
            .bind(&post.pub_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            inserted += affected as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

fn push_conditions(query: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(title) = &filter.title {
        query.push(" AND title LIKE ");
        query.push_bind(format!("%{}%", escape_like(title)));
        query.push(" ESCAPE '\\'");
    }
    if let Some(day) = filter.pub_date {
        query.push(" AND date(pub_date) = ");
        query.push_bind(day.format("%Y-%m-%d").to_string());
    }
}
