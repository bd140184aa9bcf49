//! Issuing rendered rows as one or more INSERT statements.

use crate::dialect::{BatchStrategy, InsertStatement};
use crate::error::{ImportError, Result};
use crate::partition::{partition_by_bytes, partition_by_count};
use crate::render::RenderedRow;
use crate::session::{ExecOutcome, Session};
use crate::value::{Record, Value};

/// How one batch of rendered rows is sent.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'a> {
    pub statement: &'a InsertStatement,
    pub strategy: BatchStrategy,
    /// Server packet limit for [`BatchStrategy::ByteBudget`]; 0 means unlimited.
    pub max_allowed_packet: u64,
    /// Columns named in the `RETURNING` clause; empty when there is none.
    pub returning: &'a [String],
    /// Primary key columns, read from returned rows.
    pub id_columns: &'a [String],
    /// Synthesize ids from the last insert id (SQLite rowids).
    pub contiguous_ids: bool,
    pub log_statements: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub num_statements: usize,
    pub rows_affected: u64,
    /// Generated ids in input order; `None` once any statement's ids could
    /// not be recovered.
    pub ids: Option<Vec<Value>>,
    /// Full rows returned by `RETURNING`.
    pub returned: Vec<Record>,
}

impl InsertOutcome {
    fn empty(track_ids: bool) -> Self {
        Self {
            ids: track_ids.then(Vec::new),
            ..Self::default()
        }
    }

    /// Fold a later batch into this one.
    pub fn merge(&mut self, other: InsertOutcome) {
        self.num_statements += other.num_statements;
        self.rows_affected += other.rows_affected;
        self.ids = match (self.ids.take(), other.ids) {
            (Some(mut ids), Some(more)) => {
                ids.extend(more);
                Some(ids)
            }
            _ => None,
        };
        self.returned.extend(other.returned);
    }
}

/// Send `rows` following `plan.strategy`.
pub async fn insert_many<S: Session>(
    session: &mut S,
    plan: &ExecutionPlan<'_>,
    rows: &[RenderedRow],
) -> Result<InsertOutcome> {
    let track_ids = !plan.returning.is_empty() || plan.contiguous_ids;
    let mut outcome = InsertOutcome::empty(track_ids);
    if rows.is_empty() {
        return Ok(outcome);
    }

    match plan.strategy {
        BatchStrategy::ByteBudget { query_overhead } => {
            let statement = plan.statement;
            let reserved = query_overhead + statement.prologue.len() + statement.epilogue.len();
            let total = reserved
                + rows.iter().map(|r| r.sql.len()).sum::<usize>()
                + rows.len().saturating_sub(1);
            let max = usize::try_from(plan.max_allowed_packet).unwrap_or(usize::MAX);

            let groups = if max == 0 || total < max {
                vec![rows]
            } else {
                partition_by_bytes(rows, reserved, max)
            };
            if groups.len() > 1 {
                log::debug!(
                    "split {} rows into {} statements under max_allowed_packet {}",
                    rows.len(),
                    groups.len(),
                    max
                );
            }
            for group in groups {
                let done = run_plain(session, plan, &statement.sql(group), group.len()).await?;
                outcome.merge(done);
            }
        }
        BatchStrategy::RowCount { max_rows } => {
            for group in partition_by_count(rows, max_rows) {
                let done = run_plain(session, plan, &plan.statement.sql(group), group.len()).await?;
                outcome.merge(done);
            }
        }
        BatchStrategy::Returning => {
            let sql = plan.statement.sql(rows);
            let done = if plan.returning.is_empty() {
                run_plain(session, plan, &sql, rows.len()).await?
            } else {
                run_returning(session, plan, &sql, rows.len()).await?
            };
            outcome.merge(done);
        }
        BatchStrategy::Capped { max_rows } => {
            for group in partition_by_count(rows, max_rows) {
                // Rows without an identity value go first, then rows supplying one.
                let (generated, supplied): (Vec<&RenderedRow>, Vec<&RenderedRow>) = group
                    .iter()
                    .partition(|row| row.without_identity.is_some());

                if !generated.is_empty() {
                    let tuples: Vec<&str> = generated
                        .iter()
                        .filter_map(|row| row.without_identity.as_deref())
                        .collect();
                    let prologue = plan
                        .statement
                        .prologue_without_identity
                        .as_deref()
                        .unwrap_or(&plan.statement.prologue);
                    let sql = InsertStatement::assemble(prologue, &tuples, &plan.statement.epilogue);
                    let done = run_plain(session, plan, &sql, generated.len()).await?;
                    outcome.merge(done);
                }
                if !supplied.is_empty() {
                    let sql = plan.statement.sql(&supplied);
                    let done = run_plain(session, plan, &sql, supplied.len()).await?;
                    outcome.merge(done);
                }
            }
        }
    }

    Ok(outcome)
}

fn log_statement(plan: &ExecutionPlan<'_>, sql: &str, rows: usize) {
    log::debug!("insert of {} rows ({} bytes)", rows, sql.len());
    if plan.log_statements {
        log::trace!("executing: {}", sql);
    }
}

async fn execute_logged<S: Session>(
    session: &mut S,
    plan: &ExecutionPlan<'_>,
    sql: &str,
    rows: usize,
) -> Result<ExecOutcome> {
    log_statement(plan, sql, rows);
    session.execute(sql).await
}

/// Execute a statement that returns no rows, synthesizing ids when asked.
async fn run_plain<S: Session>(
    session: &mut S,
    plan: &ExecutionPlan<'_>,
    sql: &str,
    rows_sent: usize,
) -> Result<InsertOutcome> {
    let result = execute_logged(session, plan, sql, rows_sent).await?;
    let ids = plan
        .contiguous_ids
        .then(|| contiguous_ids(&result, rows_sent))
        .flatten();
    Ok(InsertOutcome {
        num_statements: 1,
        rows_affected: result.rows_affected,
        ids,
        returned: Vec::new(),
    })
}

/// Ids of a multi-row INSERT when the engine assigns them consecutively and
/// reports the last one.
fn contiguous_ids(result: &ExecOutcome, rows_sent: usize) -> Option<Vec<Value>> {
    let affected = usize::try_from(result.rows_affected).ok()?;
    if affected != rows_sent {
        log::warn!(
            "{} of {} rows inserted, generated ids cannot be attributed",
            affected,
            rows_sent
        );
        return None;
    }
    let last = result.last_insert_id?;
    let first = last - affected as i64 + 1;
    Some((first..=last).map(Value::Int).collect())
}

async fn run_returning<S: Session>(
    session: &mut S,
    plan: &ExecutionPlan<'_>,
    sql: &str,
    rows_sent: usize,
) -> Result<InsertOutcome> {
    log_statement(plan, sql, rows_sent);
    let records = session.query(sql).await?;
    let ids = if plan.id_columns.is_empty() {
        None
    } else {
        let ids = records
            .iter()
            .map(|record| id_from_record(record, plan.id_columns))
            .collect::<Result<Vec<_>>>()?;
        Some(ids)
    };
    let keep_rows = plan.returning.len() > plan.id_columns.len();
    Ok(InsertOutcome {
        num_statements: 1,
        rows_affected: records.len() as u64,
        ids,
        returned: if keep_rows { records } else { Vec::new() },
    })
}

/// The id of a returned row; composite keys become a JSON array.
fn id_from_record(record: &Record, id_columns: &[String]) -> Result<Value> {
    let mut parts = Vec::with_capacity(id_columns.len());
    for column in id_columns {
        let value = record.get(column).cloned().ok_or_else(|| {
            ImportError::UnexpectedResult(format!("RETURNING row lacks column {}", column))
        })?;
        parts.push(value);
    }
    match parts.len() {
        1 => Ok(parts.remove(0)),
        _ => Ok(Value::Json(serde_json::to_value(&parts)?)),
    }
}
