//! Database schema for complaints and the per-year reference code counters.

use crate::executor::{DbError, SqlExecutor};
use sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement,
};

pub const COMPLAINTS_TABLE: &str = "complaints";
pub const SEQUENCES_TABLE: &str = "complaint_sequences";

/// Column order used by every `SELECT`/`RETURNING` that decodes a complaint.
pub const COMPLAINT_COLUMNS: [&str; 10] = [
    "id",
    "reference_code",
    "citizen_name",
    "category",
    "description",
    "image_reference",
    "latitude",
    "longitude",
    "status",
    "created_at",
];

/// `complaints`: the unique key on `reference_code` backs up the allocator.
pub fn complaints_table() -> TableCreateStatement {
    Table::create()
        .table(COMPLAINTS_TABLE)
        .if_not_exists()
        .col(
            ColumnDef::new("id")
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new("reference_code")
                .string()
                .string_len(50)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new("citizen_name").string().string_len(255).not_null())
        .col(ColumnDef::new("category").string().string_len(100).not_null())
        .col(ColumnDef::new("description").text().not_null())
        .col(ColumnDef::new("image_reference").string().string_len(500).null())
        .col(ColumnDef::new("latitude").double().null())
        .col(ColumnDef::new("longitude").double().null())
        .col(
            ColumnDef::new("status")
                .string()
                .string_len(50)
                .not_null()
                .default("Pending"),
        )
        .col(
            ColumnDef::new("created_at")
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

pub fn complaints_created_at_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_complaints_created_at")
        .table(COMPLAINTS_TABLE)
        .col(Expr::col("created_at"))
        .to_owned()
}

/// `complaint_sequences`: one row per year holding the last issued sequence.
pub fn sequences_table() -> TableCreateStatement {
    Table::create()
        .table(SEQUENCES_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("year").integer().not_null().primary_key())
        .col(ColumnDef::new("last_value").big_integer().not_null())
        .to_owned()
}

const STATUS_CHECK_SQL: &str = r#"
    DO $$
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM pg_constraint WHERE conname = 'complaints_status_check'
        ) THEN
            ALTER TABLE complaints ADD CONSTRAINT complaints_status_check
                CHECK (status IN ('Pending', 'Assigned', 'Resolved'));
        END IF;
    END
    $$
"#;

/// Creates the tables, index and status check if they don't exist.
pub fn initialize_schema(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    executor.execute(&complaints_table().build(PostgresQueryBuilder), &[])?;
    executor.execute(&complaints_created_at_index().build(PostgresQueryBuilder), &[])?;
    executor.execute(STATUS_CHECK_SQL, &[])?;
    executor.execute(&sequences_table().build(PostgresQueryBuilder), &[])?;
    Ok(())
}
