//! PostgreSQL complaint store.
//!
//! Every operation checks a dedicated connection out of the [`DbPool`]. Creation runs
//! allocation and insert in one transaction, so a failed insert also rolls back the
//! counter advance and no sequence value is left reserved.

use super::{ComplaintStore, ListOrder, Page, StatusChange, StoreError, MAX_LIST_LIMIT};
use crate::allocator::{self, ReferenceCode};
use crate::complaint::{Complaint, NewComplaint, Status};
use crate::executor::SqlExecutor;
use crate::pool::{DbPool, PooledClient};
use crate::schema::{COMPLAINTS_TABLE, COMPLAINT_COLUMNS};
use chrono::{DateTime, Datelike, Utc};
use may_postgres::Row;
use sea_query::{Order, PostgresQueryBuilder, Query};

pub struct PgComplaintStore {
    pool: DbPool,
}

impl PgComplaintStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs `op` on a pooled connection, discarding the connection if the failure looks
    /// like a broken session rather than a statement-level error.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&PooledClient<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.pool.acquire()?;
        let result = op(&conn);
        if let Err(StoreError::Database(_)) = &result {
            conn.mark_broken();
        }
        result
    }
}

fn columns_sql() -> String {
    COMPLAINT_COLUMNS.join(", ")
}

fn parse_err(e: may_postgres::Error) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn row_to_complaint(row: &Row) -> Result<Complaint, StoreError> {
    let status: String = row.try_get("status").map_err(parse_err)?;
    let status = status
        .parse::<Status>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(parse_err)?;

    Ok(Complaint {
        id: row.try_get("id").map_err(parse_err)?,
        reference_code: ReferenceCode::from_stored(
            row.try_get("reference_code").map_err(parse_err)?,
        ),
        citizen_name: row.try_get("citizen_name").map_err(parse_err)?,
        category: row.try_get("category").map_err(parse_err)?,
        description: row.try_get("description").map_err(parse_err)?,
        image_reference: row.try_get("image_reference").map_err(parse_err)?,
        latitude: row.try_get("latitude").map_err(parse_err)?,
        longitude: row.try_get("longitude").map_err(parse_err)?,
        status,
        created_at,
    })
}

/// Builds the paginated listing query. Pagination values are integers, so inlining
/// them into the statement is safe.
pub(crate) fn list_sql(page: Page, order: ListOrder) -> String {
    let mut query = Query::select();
    query.columns(COMPLAINT_COLUMNS).from(COMPLAINTS_TABLE);
    match order {
        ListOrder::Insertion => {
            query.order_by("id", Order::Asc);
        }
        ListOrder::NewestFirst => {
            query
                .order_by("created_at", Order::Desc)
                .order_by("id", Order::Desc);
        }
    }
    query
        .limit(page.limit.min(MAX_LIST_LIMIT))
        .offset(page.offset);
    query.to_string(PostgresQueryBuilder)
}

impl ComplaintStore for PgComplaintStore {
    fn create(
        &self,
        created_at: DateTime<Utc>,
        complaint: &NewComplaint,
        attempt: u32,
    ) -> Result<Complaint, StoreError> {
        let insert_sql = format!(
            "INSERT INTO {COMPLAINTS_TABLE} \
             (reference_code, citizen_name, category, description, image_reference, latitude, longitude, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            columns_sql()
        );
        let latitude = complaint.coordinates.map(|c| c.latitude);
        let longitude = complaint.coordinates.map(|c| c.longitude);
        let status = Status::Pending.as_str();
        let year = created_at.year();

        self.with_connection(|conn| {
            let tx = conn.begin()?;
            let code = allocator::allocate(&tx, year, attempt > 1)?;
            let code_str = code.as_str();

            let row = tx.query_one(
                &insert_sql,
                &[
                    &code_str,
                    &complaint.citizen_name,
                    &complaint.category,
                    &complaint.description,
                    &complaint.image_reference,
                    &latitude,
                    &longitude,
                    &status,
                    &created_at,
                ],
            )?;
            let created = row_to_complaint(&row)?;
            tx.commit()?;
            Ok(created)
        })
    }

    fn find_by_reference_code(
        &self,
        code: &ReferenceCode,
    ) -> Result<Option<Complaint>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {COMPLAINTS_TABLE} WHERE reference_code = $1",
            columns_sql()
        );
        self.with_connection(|conn| {
            let code_str = code.as_str();
            conn.executor()
                .query_opt(&sql, &[&code_str])?
                .map(|row| row_to_complaint(&row))
                .transpose()
        })
    }

    fn list(&self, page: Page, order: ListOrder) -> Result<Vec<Complaint>, StoreError> {
        let sql = list_sql(page, order);
        self.with_connection(|conn| {
            conn.executor()
                .query_all(&sql, &[])?
                .iter()
                .map(row_to_complaint)
                .collect()
        })
    }

    fn update_status(
        &self,
        code: &ReferenceCode,
        target: Status,
    ) -> Result<Option<StatusChange>, StoreError> {
        let select_sql = format!(
            "SELECT {} FROM {COMPLAINTS_TABLE} WHERE reference_code = $1 FOR UPDATE",
            columns_sql()
        );
        let update_sql = format!(
            "UPDATE {COMPLAINTS_TABLE} SET status = $2 WHERE id = $1 RETURNING {}",
            columns_sql()
        );

        self.with_connection(|conn| {
            let tx = conn.begin()?;
            let code_str = code.as_str();
            let Some(row) = tx.query_opt(&select_sql, &[&code_str])? else {
                tx.rollback()?;
                return Ok(None);
            };

            let current = row_to_complaint(&row)?;
            if let Err(e) = current.status.transition_to(target) {
                tx.rollback()?;
                return Err(e.into());
            }

            let target_str = target.as_str();
            let row = tx.query_one(&update_sql, &[&current.id, &target_str])?;
            let updated = row_to_complaint(&row)?;
            tx.commit()?;

            Ok(Some(StatusChange {
                previous: current.status,
                complaint: updated,
            }))
        })
    }

    fn check_health(&self) -> Result<bool, StoreError> {
        self.with_connection(|conn| conn.executor().check_health().map_err(StoreError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_sql_newest_first() {
        let sql = list_sql(Page::new(20, 10), ListOrder::NewestFirst);
        assert!(sql.starts_with("SELECT"));
        assert!(sql.contains(r#"FROM "complaints""#));
        assert!(sql.contains(r#"ORDER BY "created_at" DESC, "id" DESC"#));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
    }

    #[test]
    fn test_list_sql_insertion_order() {
        let sql = list_sql(Page::new(0, 100), ListOrder::Insertion);
        assert!(sql.contains(r#"ORDER BY "id" ASC"#));
        assert!(sql.contains("LIMIT 100"));
    }

    #[test]
    fn test_list_sql_clamps_limit() {
        let sql = list_sql(Page::new(0, 50_000), ListOrder::Insertion);
        assert!(sql.contains("LIMIT 1000"));
        assert!(!sql.contains("50000"));
    }
}
