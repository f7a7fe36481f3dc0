use core::{fmt, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Error, Result, SegmentStorage, TagRange};

/// Upper bound on one storage round trip, transaction included.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = include_str!("../../sql/schema.sql");
const ADVANCE_CURSOR: &str = include_str!("../../sql/advance_cursor.sql");
const SELECT_CURSOR: &str =
    r#"SELECT "cursor", step, description FROM fyllo_segment WHERE tag = $1"#;
const LIST_TAGS: &str = "SELECT tag FROM fyllo_segment ORDER BY tag";
const REGISTER_TAG: &str = "INSERT INTO fyllo_segment (tag, step, description) \
    VALUES ($1, $2, $3) ON CONFLICT (tag) DO NOTHING";

/// Cluster-safe [`SegmentStorage`] over the PostgreSQL table `fyllo_segment`.
///
/// Each obtain runs one transaction that bumps the tag's cursor by its step
/// and reads the row back, so concurrent processes serialize on the row lock
/// and always receive disjoint ranges. Every call is bounded by a timeout and
/// never retried internally.
#[derive(Clone)]
pub struct SqlStorage {
    pool: PgPool,
    timeout: Duration,
}

impl SqlStorage {
    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(DEFAULT_QUERY_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| Error::storage("failed to connect to postgres", e))?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates `fyllo_segment` if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts a counter row for `tag` starting at cursor zero. Resolves to
    /// `false` if the tag already exists, in which case the row is unchanged.
    pub async fn register(&self, tag: &str, step: u64, description: &str) -> Result<bool> {
        let step = i64::try_from(step)
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| Error::config(format!("tag [{tag}] step [{step}] is out of range")))?;
        let inserted = sqlx::query(REGISTER_TAG)
            .bind(tag)
            .bind(step)
            .bind(description)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(inserted == 1)
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let tags: Vec<String> = sqlx::query_scalar(LIST_TAGS).fetch_all(&self.pool).await?;
        Ok(tags)
    }

    async fn advance(&self, tag: &str) -> Result<TagRange> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(ADVANCE_CURSOR)
            .bind(tag)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated != 1 {
            return Err(Error::UnknownTag {
                tag: tag.to_owned(),
            });
        }

        let (cursor, step, description): (i64, i64, String) = sqlx::query_as(SELECT_CURSOR)
            .bind(tag)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        to_range(tag, cursor, step, description)
    }

    async fn bounded<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|elapsed| Error::storage(format!("{what} timed out"), elapsed))?
    }
}

impl fmt::Debug for SqlStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStorage")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SegmentStorage for SqlStorage {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        self.bounded("listing segment tags", self.list_tags()).boxed()
    }

    fn obtain<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<TagRange>> {
        self.bounded("obtaining a segment range", self.advance(tag)).boxed()
    }
}

/// Converts a row read back after the cursor update into the range it covers.
fn to_range(tag: &str, cursor: i64, step: i64, description: String) -> Result<TagRange> {
    let low = cursor.checked_sub(step).and_then(|v| v.checked_add(1));
    match (low.map(u64::try_from), u64::try_from(cursor)) {
        (Some(Ok(low)), Ok(high)) => {
            Ok(TagRange::new(tag, low, high).with_description(description))
        }
        _ => Err(Error::Storage {
            context: format!("tag [{tag}] has invalid cursor [{cursor}] or step [{step}]"),
            source: None,
        }),
    }
}
