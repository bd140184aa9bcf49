//! Conflict handling options and the clause builder shared by all dialects.

use crate::config::CapabilityPolicy;
use crate::dialect::{Dialect, EngineVersion};
use crate::error::{Capability, ImportError, Result};

/// What a conflict is detected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictTarget {
    Columns(Vec<String>),
    /// A named unique constraint (PostgreSQL only).
    Constraint(String),
}

impl ConflictTarget {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConflictTarget::Columns(columns.into_iter().map(Into::into).collect())
    }

    pub fn constraint(name: impl Into<String>) -> Self {
        ConflictTarget::Constraint(name.into())
    }
}

/// Columns overwritten when an inserted row conflicts with an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateColumns {
    /// Each listed column takes the incoming row's value.
    List(Vec<String>),
    /// `(target, source)`: `target` takes the incoming value of `source`.
    Map(Vec<(String, String)>),
}

impl UpdateColumns {
    pub fn is_empty(&self) -> bool {
        match self {
            UpdateColumns::List(columns) => columns.is_empty(),
            UpdateColumns::Map(pairs) => pairs.is_empty(),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        match self {
            UpdateColumns::List(columns) => columns.iter().any(|c| c == column),
            UpdateColumns::Map(pairs) => pairs.iter().any(|(target, _)| target == column),
        }
    }

    /// Add `column` as updated from itself unless it is already a target.
    pub fn add(&mut self, column: &str) {
        if self.contains(column) {
            return;
        }
        match self {
            UpdateColumns::List(columns) => columns.push(column.to_string()),
            UpdateColumns::Map(pairs) => pairs.push((column.to_string(), column.to_string())),
        }
    }

    /// `(target, source)` pairs in declaration order.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            UpdateColumns::List(columns) => {
                columns.iter().map(|c| (c.as_str(), c.as_str())).collect()
            }
            UpdateColumns::Map(pairs) => pairs
                .iter()
                .map(|(target, source)| (target.as_str(), source.as_str()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnDuplicateKeyUpdate {
    pub columns: UpdateColumns,
    pub conflict_target: Option<ConflictTarget>,
}

impl OnDuplicateKeyUpdate {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: UpdateColumns::List(columns.into_iter().map(Into::into).collect()),
            conflict_target: None,
        }
    }

    pub fn mapping<I, T, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        Self {
            columns: UpdateColumns::Map(
                pairs
                    .into_iter()
                    .map(|(target, source)| (target.into(), source.into()))
                    .collect(),
            ),
            conflict_target: None,
        }
    }

    pub fn conflict_target(mut self, target: ConflictTarget) -> Self {
        self.conflict_target = Some(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DuplicateKeyIgnore {
    #[default]
    Off,
    On,
    /// Ignore conflicts on a specific target only.
    Target(ConflictTarget),
}

impl DuplicateKeyIgnore {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, DuplicateKeyIgnore::Off)
    }
}

/// The conflict-related parts of one INSERT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictClause {
    /// Use the dialect's ignoring insert keyword.
    pub ignore_keyword: bool,
    /// Clause appended after the value tuples.
    pub suffix: String,
    /// Duplicate rows are skipped silently, so fewer rows than sent may be inserted.
    pub skips_rows: bool,
}

/// Gate a feature on engine support.
///
/// Returns `Ok(true)` when the feature can be used, `Ok(false)` when it is
/// unsupported and the policy says to drop it.
pub fn check_capability(
    policy: CapabilityPolicy,
    capability: Capability,
    supported: bool,
    dialect: &dyn Dialect,
    version: &EngineVersion,
) -> Result<bool> {
    if supported {
        return Ok(true);
    }
    match policy {
        CapabilityPolicy::Error => Err(ImportError::Unsupported {
            capability,
            engine: dialect.name(),
            version: version.to_string(),
        }),
        CapabilityPolicy::Warn => {
            log::warn!(
                "{} is not supported by {} {}, ignoring it",
                capability,
                dialect.name(),
                version
            );
            Ok(false)
        }
    }
}

/// Everything [`build_conflict_clause`] needs to know about the import.
pub struct ConflictRequest<'a> {
    pub table: &'a str,
    pub primary_key: &'a [String],
    pub update: Option<&'a OnDuplicateKeyUpdate>,
    pub ignore: &'a DuplicateKeyIgnore,
    pub version: &'a EngineVersion,
    pub policy: CapabilityPolicy,
}

/// Resolve the conflict options into SQL for `dialect`.
///
/// An update request takes precedence over an ignore request.
pub fn build_conflict_clause(
    dialect: &dyn Dialect,
    request: &ConflictRequest<'_>,
) -> Result<ConflictClause> {
    if let Some(update) = request.update {
        if request.ignore.is_enabled() {
            log::debug!(
                "on_duplicate_key_update takes precedence over on_duplicate_key_ignore for {}",
                request.table
            );
        }
        let supported = dialect.supports_upsert(request.version);
        if !check_capability(
            request.policy,
            Capability::Upsert,
            supported,
            dialect,
            request.version,
        )? {
            return Ok(ConflictClause::default());
        }
        if update.columns.is_empty() {
            return Err(ImportError::EmptyUpdateColumns {
                table: request.table.to_string(),
            });
        }

        let target = if dialect.requires_update_target() {
            Some(resolve_target(
                update.conflict_target.as_ref(),
                request.primary_key,
                request.table,
            )?)
        } else {
            None
        };
        let suffix = dialect.on_conflict_update(
            &dialect.quote_table(request.table),
            target.as_ref(),
            &update.columns,
        )?;
        return Ok(ConflictClause {
            ignore_keyword: false,
            suffix,
            skips_rows: false,
        });
    }

    let target = match request.ignore {
        DuplicateKeyIgnore::Off => return Ok(ConflictClause::default()),
        DuplicateKeyIgnore::On => None,
        DuplicateKeyIgnore::Target(target) => Some(target),
    };
    let supported = dialect.supports_ignore(request.version);
    if !check_capability(
        request.policy,
        Capability::Ignore,
        supported,
        dialect,
        request.version,
    )? {
        return Ok(ConflictClause::default());
    }

    if dialect.ignore_via_keyword() {
        return Ok(ConflictClause {
            ignore_keyword: true,
            suffix: String::new(),
            skips_rows: true,
        });
    }
    Ok(ConflictClause {
        ignore_keyword: false,
        suffix: dialect.on_conflict_ignore(target).unwrap_or_default(),
        skips_rows: true,
    })
}

fn resolve_target(
    explicit: Option<&ConflictTarget>,
    primary_key: &[String],
    table: &str,
) -> Result<ConflictTarget> {
    if let Some(target) = explicit {
        return Ok(target.clone());
    }
    if primary_key.is_empty() {
        return Err(ImportError::MissingConflictTarget {
            table: table.to_string(),
        });
    }
    Ok(ConflictTarget::Columns(primary_key.to_vec()))
}

/// `"a","b"` for a column target.
pub(crate) fn quoted_column_list(dialect: &dyn Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(",")
}
