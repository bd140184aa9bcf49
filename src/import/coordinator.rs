//! Import coordination.
//!
//! The [`Importer`] drives one import end to end:
//! 1. Normalize the input to a column list and value rows
//! 2. Inject sequence keys, timestamps and scope columns
//! 3. Validate rows and drop (or abort on) failures
//! 4. Render rows and build the statement around them
//! 5. Insert in batches under the engine's size constraint
//! 6. Write generated ids back, synchronize, recurse into children

use crate::config::{ImportConfig, TimestampZone};
use crate::dialect::execute::{ExecutionPlan, InsertOutcome, insert_many};
use crate::dialect::upsert::{ConflictClause, ConflictRequest, build_conflict_clause, check_capability};
use crate::dialect::{BatchStrategy, Dialect, Engine, EngineVersion, IdRetrieval, InsertStatement};
use crate::error::{Capability, ImportError, Result};
use crate::import::associations::collect_children;
use crate::import::normalize::{Normalized, normalize};
use crate::import::request::{ImportOptions, ImportRequest, Rows, Synchronize};
use crate::import::result::{ChildImport, FailedRecord, ImportResult};
use crate::import::synchronize::synchronize;
use crate::import::validation::validate_record;
use crate::model::Model;
use crate::render::{RenderedRow, RowRenderer, inject_primary_key, inject_scope, inject_timestamps};
use crate::schema::TableSchema;
use crate::session::Session;
use crate::value::{Record, Value};
use chrono::{Local, Utc};

const SAVEPOINT: &str = "bulk_import";

/// Server facts looked up once per importer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineLimits {
    pub version: Option<EngineVersion>,
    pub max_allowed_packet: Option<u64>,
}

/// Bulk inserts over one session.
///
/// Server version and packet limits are cached after the first lookup;
/// call [`Importer::invalidate_limits`] after reconnecting elsewhere.
pub struct Importer<'s, S: Session> {
    session: &'s mut S,
    dialect: Box<dyn Dialect>,
    config: ImportConfig,
    limits: EngineLimits,
}

impl<'s, S: Session> Importer<'s, S> {
    /// An importer configured from the environment.
    pub fn new(session: &'s mut S, engine: Engine) -> Self {
        Self::with_config(session, engine, ImportConfig::from_env())
    }

    pub fn with_config(session: &'s mut S, engine: Engine, config: ImportConfig) -> Self {
        let dialect = engine.dialect(&config);
        Self::with_dialect(session, dialect, config)
    }

    pub fn with_dialect(session: &'s mut S, dialect: Box<dyn Dialect>, config: ImportConfig) -> Self {
        Self {
            session,
            dialect,
            config,
            limits: EngineLimits::default(),
        }
    }

    /// Skip the version lookup and plan for `version`.
    pub fn assume_version(mut self, version: EngineVersion) -> Self {
        self.limits.version = Some(version);
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    pub fn invalidate_limits(&mut self) {
        self.limits = EngineLimits::default();
    }

    pub async fn server_version(&mut self) -> Result<EngineVersion> {
        if let Some(version) = self.limits.version {
            return Ok(version);
        }
        let raw = first_value(self.session.query(self.dialect.version_query()).await?)
            .ok_or_else(|| ImportError::UnexpectedResult("version query returned no rows".into()))?
            .to_string();
        let version = EngineVersion::parse(&raw).ok_or_else(|| {
            ImportError::UnexpectedResult(format!("cannot parse server version '{}'", raw))
        })?;
        log::debug!("{} server version {}", self.dialect.name(), version);
        self.limits.version = Some(version);
        Ok(version)
    }

    /// Packet size limit in bytes; 0 when the engine has none.
    pub async fn max_allowed_packet(&mut self) -> Result<u64> {
        if let Some(limit) = self.limits.max_allowed_packet {
            return Ok(limit);
        }
        let limit = match self.dialect.max_packet_query() {
            None => 0,
            Some(sql) => {
                let value = first_value(self.session.query(sql).await?).ok_or_else(|| {
                    ImportError::UnexpectedResult("max_allowed_packet query returned no rows".into())
                })?;
                value
                    .as_i64()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| {
                        ImportError::UnexpectedResult(format!(
                            "max_allowed_packet is not a number: {}",
                            value
                        ))
                    })?
            }
        };
        self.limits.max_allowed_packet = Some(limit);
        Ok(limit)
    }

    /// Reserve `count` consecutive values of `sequence`, returning the first.
    pub async fn reserve_sequence_range(&mut self, sequence: &str, count: u32) -> Result<i64> {
        let sql = self
            .dialect
            .sequence_reservation_sql(sequence, count)
            .ok_or_else(|| {
                ImportError::Config(format!("{} has no sequences", self.dialect.name()))
            })?;
        first_value(self.session.query(&sql).await?)
            .and_then(|value| value.as_i64())
            .ok_or_else(|| {
                ImportError::UnexpectedResult(format!("could not reserve ids from {}", sequence))
            })
    }

    /// Insert the request's rows into `schema`'s table.
    ///
    /// Configuration errors are raised before any row is sent. Engine errors
    /// abort the import and propagate; on SQLite the import's statements are
    /// rolled back to a savepoint first.
    pub async fn import(
        &mut self,
        schema: &TableSchema,
        request: ImportRequest<'_>,
    ) -> Result<ImportResult> {
        let ImportRequest {
            columns,
            rows,
            mut options,
            synchronize: sync_targets,
        } = request;
        if matches!(sync_targets, Synchronize::Imported) && !matches!(rows, Rows::Models(_)) {
            return Err(ImportError::Config(
                "synchronize requires model input".to_string(),
            ));
        }
        if rows.is_empty() {
            log::debug!("nothing to import into {}", schema.table_name);
            return Ok(ImportResult::default());
        }
        if options.batch_size.is_none() {
            options.batch_size = self.config.default_batch_size;
        }
        let primary_key = options
            .primary_key
            .clone()
            .unwrap_or_else(|| schema.primary_key.clone());

        let Normalized {
            mut columns,
            mut rows,
            models,
        } = normalize(schema, columns, rows, &primary_key)?;

        inject_primary_key(schema, &primary_key, &mut columns, &mut rows);
        if options.timestamps && schema.record_timestamps {
            let now = self.now();
            let update = options
                .on_duplicate_key_update
                .as_mut()
                .map(|update| &mut update.columns);
            inject_timestamps(schema, &mut columns, &mut rows, &now, update);
        }
        inject_scope(&options.scope, &mut columns, &mut rows);

        let version = self.server_version().await?;
        let strategy = self.dialect.batch_strategy(&version);
        let max_allowed_packet = match strategy {
            BatchStrategy::ByteBudget { .. } => self.max_allowed_packet().await?,
            _ => 0,
        };

        let conflict = build_conflict_clause(
            self.dialect.as_ref(),
            &ConflictRequest {
                table: &schema.table_name,
                primary_key: &primary_key,
                update: options.on_duplicate_key_update.as_ref(),
                ignore: &options.on_duplicate_key_ignore,
                version: &version,
                policy: self.config.unsupported_capability,
            },
        )?;
        let returning = self.returning_columns(&options, &primary_key, &version)?;
        let recursive = match &models {
            Some(_) if options.recursive => self.can_recurse(&options, &primary_key, &version)?,
            _ => false,
        };

        let renderer = RowRenderer::new(
            self.dialect.as_ref(),
            schema,
            &columns,
            &primary_key,
            matches!(strategy, BatchStrategy::Capped { .. }),
        )?;
        let statement = self.insert_statement(
            schema,
            &columns,
            &conflict,
            &returning,
            renderer.identity_index(),
        );

        let (failed, valid) = validate_rows(schema, &columns, &rows, models.as_deref(), &options);
        if options.all_or_none && !failed.is_empty() {
            log::info!(
                "{} of {} rows for {} failed validation, importing none",
                failed.len(),
                rows.len(),
                schema.table_name
            );
            return Ok(ImportResult {
                failed_records: failed,
                ..ImportResult::default()
            });
        }

        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .zip(&valid)
            .filter_map(|(row, ok)| ok.then_some(row))
            .collect();
        let mut models: Option<Vec<&mut dyn Model>> = models.map(|models| {
            models
                .into_iter()
                .zip(&valid)
                .filter_map(|(model, ok)| ok.then_some(model))
                .collect()
        });
        if rows.is_empty() {
            return Ok(ImportResult {
                failed_records: failed,
                ..ImportResult::default()
            });
        }

        let rendered = rows
            .iter()
            .map(|row| renderer.render(row))
            .collect::<Result<Vec<_>>>()?;
        drop(renderer);

        let ids_returned = primary_key.iter().all(|pk| returning.contains(pk));
        let id_columns: &[String] = if ids_returned && !returning.is_empty() {
            &primary_key
        } else {
            &[]
        };
        // A rowid range only maps onto rows whose keys the engine assigned,
        // and an upsert reports updated rows inside the same count.
        let contiguous_ids = self.dialect.id_retrieval() == IdRetrieval::ContiguousRange
            && options.on_duplicate_key_update.is_none()
            && keys_generated(&columns, &rows, &primary_key);
        if self.dialect.id_retrieval() == IdRetrieval::ContiguousRange && !contiguous_ids {
            log::debug!(
                "keys for {} are supplied or upserted, not synthesizing ids",
                schema.table_name
            );
        }
        let plan = ExecutionPlan {
            statement: &statement,
            strategy,
            max_allowed_packet,
            returning: &returning,
            id_columns,
            contiguous_ids,
            log_statements: self.config.log_statements,
        };
        let batch_size = options
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(rendered.len());
        let mut outcome = self.run_batches(&plan, &rendered, batch_size).await?;

        let generated_ids = match outcome.ids.take() {
            Some(ids) if ids.len() == rows.len() => ids,
            Some(ids) if !ids.is_empty() => {
                if conflict.skips_rows {
                    log::debug!(
                        "{} of {} rows into {} were new, not assigning ids",
                        ids.len(),
                        rows.len(),
                        schema.table_name
                    );
                } else {
                    log::warn!(
                        "{} ids reported for {} rows into {}, not assigning them",
                        ids.len(),
                        rows.len(),
                        schema.table_name
                    );
                }
                Vec::new()
            }
            _ => Vec::new(),
        };
        log::info!(
            "imported {} rows into {} with {} statements ({} failed validation)",
            outcome.rows_affected,
            schema.table_name,
            outcome.num_statements,
            failed.len()
        );

        if let (Some(models), [pk]) = (models.as_mut(), primary_key.as_slice()) {
            if !generated_ids.is_empty() {
                for (model, id) in models.iter_mut().zip(&generated_ids) {
                    model.write_attribute(pk, id.clone());
                    model.mark_persisted();
                }
            }
        }

        let sync_keys = if options.synchronize_keys.is_empty() {
            primary_key.clone()
        } else {
            options.synchronize_keys.clone()
        };
        match sync_targets {
            Synchronize::None => {}
            Synchronize::Imported => {
                if let Some(models) = models.as_mut() {
                    synchronize(&mut *self.session, self.dialect.as_ref(), schema, &sync_keys, models)
                        .await?;
                }
            }
            Synchronize::Models(mut targets) => {
                synchronize(
                    &mut *self.session,
                    self.dialect.as_ref(),
                    schema,
                    &sync_keys,
                    &mut targets,
                )
                .await?;
            }
        }

        let mut children = Vec::new();
        if recursive && generated_ids.is_empty() {
            log::debug!(
                "no ids assigned for {}, skipping child imports",
                schema.table_name
            );
        }
        if let (true, Some(models), [pk]) = (
            recursive && !generated_ids.is_empty(),
            models.as_mut(),
            primary_key.as_slice(),
        ) {
            let child_options = options.for_children();
            for group in collect_children(models, pk) {
                let table = group.schema.table_name.clone();
                log::debug!("importing {} children into {}", group.records.len(), table);
                let request = ImportRequest::models(group.records).options(child_options.clone());
                let result = Box::pin(self.import(&group.schema, request)).await?;
                children.push(ChildImport { table, result });
            }
        }

        Ok(ImportResult {
            failed_records: failed,
            num_statements: outcome.num_statements,
            generated_ids,
            returned_rows: outcome.returned,
            rows_affected: outcome.rows_affected,
            children,
        })
    }

    fn now(&self) -> Value {
        match self.config.default_timezone {
            TimestampZone::Utc => Value::Timestamp(Utc::now().naive_utc()),
            TimestampZone::Local => Value::Timestamp(Local::now().naive_local()),
        }
    }

    /// Columns for the `RETURNING` clause: the primary key when the engine
    /// returns ids, then any extra requested columns.
    fn returning_columns(
        &self,
        options: &ImportOptions,
        primary_key: &[String],
        version: &EngineVersion,
    ) -> Result<Vec<String>> {
        let supported = self.dialect.id_retrieval() == IdRetrieval::Returning;
        let mut columns = Vec::new();
        if supported && !options.no_returning {
            columns.extend(primary_key.iter().cloned());
        }
        if !options.returning.is_empty()
            && check_capability(
                self.config.unsupported_capability,
                Capability::Returning,
                supported,
                self.dialect.as_ref(),
                version,
            )?
        {
            for column in &options.returning {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        Ok(columns)
    }

    fn can_recurse(
        &self,
        options: &ImportOptions,
        primary_key: &[String],
        version: &EngineVersion,
    ) -> Result<bool> {
        let ids_available = match self.dialect.id_retrieval() {
            IdRetrieval::None => false,
            IdRetrieval::Returning => !options.no_returning,
            IdRetrieval::ContiguousRange => true,
        } && primary_key.len() == 1;
        check_capability(
            self.config.unsupported_capability,
            Capability::RecursiveImport,
            ids_available,
            self.dialect.as_ref(),
            version,
        )
    }

    fn insert_statement(
        &self,
        schema: &TableSchema,
        columns: &[String],
        conflict: &ConflictClause,
        returning: &[String],
        identity_index: Option<usize>,
    ) -> InsertStatement {
        let dialect = self.dialect.as_ref();
        let head = format!(
            "{} {}",
            dialect.insert_keyword(conflict.ignore_keyword),
            dialect.quote_table(&schema.table_name)
        );
        let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();

        let prologue_without_identity = identity_index.map(|skip| {
            let rest: Vec<&str> = quoted
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| c.as_str())
                .collect();
            format!("{} ({}) VALUES ", head, rest.join(","))
        });

        let mut epilogue = conflict.suffix.clone();
        if let Some(clause) = dialect.returning_clause(returning) {
            epilogue.push_str(&clause);
        }

        InsertStatement {
            prologue: format!("{} ({}) VALUES ", head, quoted.join(",")),
            prologue_without_identity,
            epilogue,
        }
    }

    /// Run every batch, inside a savepoint when the dialect asks for one.
    async fn run_batches(
        &mut self,
        plan: &ExecutionPlan<'_>,
        rows: &[RenderedRow],
        batch_size: usize,
    ) -> Result<InsertOutcome> {
        if !self.dialect.wraps_in_savepoint() {
            return self.insert_batches(plan, rows, batch_size).await;
        }

        self.session.execute(&format!("SAVEPOINT {}", SAVEPOINT)).await?;
        match self.insert_batches(plan, rows, batch_size).await {
            Ok(outcome) => {
                self.session
                    .execute(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
                    .await?;
                Ok(outcome)
            }
            Err(err) => {
                match self
                    .session
                    .execute(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))
                    .await
                {
                    Ok(_) => {
                        if let Err(release) = self
                            .session
                            .execute(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
                            .await
                        {
                            log::warn!("failed to release savepoint after rollback: {}", release);
                        }
                    }
                    Err(rollback) => log::error!("failed to roll back import: {}", rollback),
                }
                Err(err)
            }
        }
    }

    async fn insert_batches(
        &mut self,
        plan: &ExecutionPlan<'_>,
        rows: &[RenderedRow],
        batch_size: usize,
    ) -> Result<InsertOutcome> {
        let mut outcome: Option<InsertOutcome> = None;
        for batch in rows.chunks(batch_size) {
            let done = insert_many(&mut *self.session, plan, batch).await?;
            match outcome.as_mut() {
                Some(total) => total.merge(done),
                None => outcome = Some(done),
            }
        }
        Ok(outcome.unwrap_or_default())
    }
}

/// Validate every row; returns the failures and a keep-mask aligned with `rows`.
fn validate_rows(
    schema: &TableSchema,
    columns: &[String],
    rows: &[Vec<Value>],
    models: Option<&[&mut dyn Model]>,
    options: &ImportOptions,
) -> (Vec<FailedRecord>, Vec<bool>) {
    let mut failed = Vec::new();
    let mut valid = vec![true; rows.len()];
    if !options.validate {
        return (failed, valid);
    }

    for (index, row) in rows.iter().enumerate() {
        let record = Record::from_parts(columns.to_vec(), row.clone());
        let mut errors = validate_record(&schema.validations, &record);
        if let Some(model) = models.and_then(|models| models.get(index)) {
            errors.extend(model.validate());
        }
        if !errors.is_empty() {
            valid[index] = false;
            failed.push(FailedRecord {
                index,
                record,
                errors,
            });
        }
    }
    (failed, valid)
}

fn first_value(rows: Vec<Record>) -> Option<Value> {
    rows.into_iter().next()?.into_values().into_iter().next()
}

/// True when the single key column is absent or null in every row.
fn keys_generated(columns: &[String], rows: &[Vec<Value>], primary_key: &[String]) -> bool {
    let [pk] = primary_key else {
        return false;
    };
    match columns.iter().position(|column| column == pk) {
        Some(index) => rows.iter().all(|row| row.get(index).is_none_or(Value::is_null)),
        None => true,
    }
}
