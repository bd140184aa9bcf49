use crate::dialect::{DuplicateKeyIgnore, OnDuplicateKeyUpdate};
use crate::model::Model;
use crate::value::{Record, Value};

/// The three accepted input shapes.
pub enum Rows<'a> {
    /// Positional rows; the request must name the columns.
    Values(Vec<Vec<Value>>),
    /// Column-keyed records, all carrying the same columns.
    Records(Vec<Record>),
    /// Models, which get their generated ids written back.
    Models(Vec<&'a mut dyn Model>),
}

impl Rows<'_> {
    pub fn len(&self) -> usize {
        match self {
            Rows::Values(rows) => rows.len(),
            Rows::Records(rows) => rows.len(),
            Rows::Models(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Models to refresh from the database after the insert.
#[derive(Default)]
pub enum Synchronize<'a> {
    #[default]
    None,
    /// The imported models themselves.
    Imported,
    /// Other model instances, matched on the synchronize keys.
    Models(Vec<&'a mut dyn Model>),
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Run validations and skip (or, with `all_or_none`, abort on) invalid rows.
    pub validate: bool,
    pub all_or_none: bool,
    pub on_duplicate_key_update: Option<OnDuplicateKeyUpdate>,
    pub on_duplicate_key_ignore: DuplicateKeyIgnore,
    /// Columns used to match synchronized models; defaults to the primary key.
    pub synchronize_keys: Vec<String>,
    /// Maximum rows per batch; each batch is planned independently.
    pub batch_size: Option<usize>,
    /// Also import new or changed children of model inputs.
    pub recursive: bool,
    pub timestamps: bool,
    /// Overrides the schema's primary key.
    pub primary_key: Option<Vec<String>>,
    /// Column values added to every row when the caller does not supply the column.
    pub scope: Vec<(String, Value)>,
    /// Extra columns to return from the insert.
    pub returning: Vec<String>,
    /// Do not ask the engine for generated ids.
    pub no_returning: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            validate: true,
            all_or_none: false,
            on_duplicate_key_update: None,
            on_duplicate_key_ignore: DuplicateKeyIgnore::Off,
            synchronize_keys: Vec::new(),
            batch_size: None,
            recursive: false,
            timestamps: true,
            primary_key: None,
            scope: Vec::new(),
            returning: Vec::new(),
            no_returning: false,
        }
    }
}

impl ImportOptions {
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn all_or_none(mut self, enabled: bool) -> Self {
        self.all_or_none = enabled;
        self
    }

    pub fn on_duplicate_key_update(mut self, update: OnDuplicateKeyUpdate) -> Self {
        self.on_duplicate_key_update = Some(update);
        self
    }

    pub fn on_duplicate_key_ignore(mut self, ignore: DuplicateKeyIgnore) -> Self {
        self.on_duplicate_key_ignore = ignore;
        self
    }

    pub fn synchronize_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synchronize_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.recursive = enabled;
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn scope(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.push((column.into(), value.into()));
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn no_returning(mut self, enabled: bool) -> Self {
        self.no_returning = enabled;
        self
    }

    /// Options carried into child imports: conflict updates, synchronization,
    /// scope and returned columns belong to the parent table only.
    pub(crate) fn for_children(&self) -> Self {
        Self {
            on_duplicate_key_update: None,
            synchronize_keys: Vec::new(),
            primary_key: None,
            scope: Vec::new(),
            returning: Vec::new(),
            ..self.clone()
        }
    }
}

pub struct ImportRequest<'a> {
    pub columns: Option<Vec<String>>,
    pub rows: Rows<'a>,
    pub options: ImportOptions,
    pub synchronize: Synchronize<'a>,
}

impl<'a> ImportRequest<'a> {
    pub fn new(rows: Rows<'a>) -> Self {
        Self {
            columns: None,
            rows,
            options: ImportOptions::default(),
            synchronize: Synchronize::None,
        }
    }

    pub fn values<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Rows::Values(rows)).columns(columns)
    }

    pub fn records(rows: Vec<Record>) -> Self {
        Self::new(Rows::Records(rows))
    }

    pub fn models(models: Vec<&'a mut dyn Model>) -> Self {
        Self::new(Rows::Models(models))
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn synchronize(mut self, synchronize: Synchronize<'a>) -> Self {
        self.synchronize = synchronize;
        self
    }
}

/// Borrow a slice of concrete models as trait objects.
pub fn model_refs<'a, M: Model + 'a>(models: &'a mut [M]) -> Vec<&'a mut dyn Model> {
    models.iter_mut().map(|m| m as &mut dyn Model).collect()
}
