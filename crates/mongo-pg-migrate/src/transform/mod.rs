//! Record transformers: raw source document in, target-shape record out.
//!
//! One pure function per entity kind, dispatched by table name over a
//! closed set (an unknown table is an explicit error, not a reflective
//! fallback). Transformers parse, never trust: each one reads exactly the
//! fields it knows, mints the record's own id through the
//! [`IdMapper`](crate::idmap::IdMapper), rewrites every foreign key,
//! coerces date-like fields to canonical UTC timestamps, validates
//! enumerated fields against their allow-list (substituting the documented
//! default with a warning), and passes free-form nested structures through
//! untouched. Failures are returned, never thrown past the call site: the
//! loader converts them into journal entries so a bad record cannot abort
//! its batch.

mod entities;

use crate::error::{MigrateError, Result};
use crate::idmap::IdMapper;
use crate::plan::FieldKind;
use crate::store::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::warn;

/// Transform one raw document for `table`. The single entry point of the
/// registry; table names outside the plan's closed set are an error.
pub fn transform(table: &str, doc: &Value, mapper: &IdMapper) -> Result<Record> {
    use entities::*;
    match table {
        "tenants" => tenants(doc, mapper),
        "currencies" => currencies(doc, mapper),
        "roles" => roles(doc, mapper),
        "product_categories" => product_categories(doc, mapper),
        "users" => users(doc, mapper),
        "teams" => teams(doc, mapper),
        "pipelines" => pipelines(doc, mapper),
        "products" => products(doc, mapper),
        "email_templates" => email_templates(doc, mapper),
        "accounts" => accounts(doc, mapper),
        "boards" => boards(doc, mapper),
        "campaigns" => campaigns(doc, mapper),
        "pipeline_stages" => pipeline_stages(doc, mapper),
        "contacts" => contacts(doc, mapper),
        "opportunities" => opportunities(doc, mapper),
        "invoices" => invoices(doc, mapper),
        "tasks" => tasks(doc, mapper),
        "documents" => documents(doc, mapper),
        "activities" => activities(doc, mapper),
        "payments" => payments(doc, mapper),
        "comments" => comments(doc, mapper),
        other => Err(MigrateError::UnknownTable(other.to_string())),
    }
}

/// Coerce a date-like JSON value to a canonical UTC timestamp.
///
/// Accepts RFC 3339 strings, epoch milliseconds, and the mongoexport
/// extended-JSON shapes `{"$date": <string|millis>}` and
/// `{"$date": {"$numberLong": "<millis>"}}`. Anything else is `None`.
pub fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::Object(map) => {
            if let Some(inner) = map.get("$date") {
                return coerce_timestamp(inner);
            }
            map.get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis)
        }
        _ => None,
    }
}

/// Source id of a raw document (`_id` as plain string or extended-JSON
/// `{"$oid": "..."}`).
pub fn source_id_of(doc: &Value) -> Option<&str> {
    match doc.get("_id")? {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str),
        _ => None,
    }
}

/// Builder shared by every entity transformer: holds the raw document, the
/// minted id, and the record under construction.
pub(crate) struct Tx<'a> {
    table: &'static str,
    doc: &'a Value,
    source_id: String,
    mapper: &'a IdMapper,
    out: Record,
}

impl<'a> Tx<'a> {
    /// Extract and validate `_id`, mint the record's own target id.
    pub(crate) fn new(table: &'static str, doc: &'a Value, mapper: &'a IdMapper) -> Result<Self> {
        let source_id = source_id_of(doc)
            .ok_or_else(|| MigrateError::transform(table, "<missing>", "missing required field _id"))?
            .to_string();
        let id = mapper.map_or_create(&source_id).map_err(|e| {
            MigrateError::transform(table, source_id.clone(), e.to_string())
        })?;
        let mut out = Record::new();
        out.insert("id".to_string(), Value::String(id.to_string()));
        Ok(Self {
            table,
            doc,
            source_id,
            mapper,
            out,
        })
    }

    fn raw(&self, src: &str) -> Option<&Value> {
        self.doc.get(src)
    }

    /// Required text field: a missing or non-string value fails the record.
    pub(crate) fn required_text(&mut self, col: &str, src: &str) -> Result<&mut Self> {
        match self.raw(src).and_then(Value::as_str) {
            Some(s) => {
                self.out.insert(col.to_string(), Value::String(s.to_string()));
                Ok(self)
            }
            None => Err(MigrateError::transform(
                self.table,
                self.source_id.clone(),
                format!("missing required field {src}"),
            )),
        }
    }

    /// Optional text field; absent or non-string becomes null.
    pub(crate) fn text(&mut self, col: &str, src: &str) -> &mut Self {
        let value = match self.raw(src) {
            Some(Value::String(s)) => Value::String(s.clone()),
            _ => Value::Null,
        };
        self.out.insert(col.to_string(), value);
        self
    }

    /// Date-like field coerced to a canonical UTC timestamp; invalid or
    /// missing becomes null.
    pub(crate) fn timestamp(&mut self, col: &str, src: &str) -> &mut Self {
        let value = match self.raw(src) {
            None | Some(Value::Null) => Value::Null,
            Some(raw) => match coerce_timestamp(raw) {
                Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => {
                    warn!(
                        "{}.{src}: uncoercible timestamp {raw} for {}, storing null",
                        self.table, self.source_id
                    );
                    Value::Null
                }
            },
        };
        self.out.insert(col.to_string(), value);
        self
    }

    /// Enumerated field: values outside the allow-list substitute the
    /// documented default with a warning, never keep the invalid value.
    pub(crate) fn enumerated(&mut self, col: &str, src: &str, kind: FieldKind) -> &mut Self {
        let (allowed, default) = match kind {
            FieldKind::Enum { allowed, default } => (allowed, default),
            _ => unreachable!("enumerated() requires an Enum field kind"),
        };
        let value = match self.raw(src).and_then(Value::as_str) {
            Some(s) if allowed.contains(&s) => s.to_string(),
            Some(s) => {
                warn!(
                    "{}.{src}: invalid enum value {s:?} for {}, substituting {default:?}",
                    self.table, self.source_id
                );
                default.to_string()
            }
            None => default.to_string(),
        };
        self.out.insert(col.to_string(), Value::String(value));
        self
    }

    /// Numeric field; numbers pass through, numeric strings are parsed,
    /// anything else becomes null.
    pub(crate) fn number(&mut self, col: &str, src: &str) -> &mut Self {
        let value = match self.raw(src) {
            Some(Value::Number(n)) => Value::Number(n.clone()),
            Some(Value::String(s)) => match s.parse::<f64>() {
                Ok(f) => serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Err(_) => Value::Null,
            },
            _ => Value::Null,
        };
        self.out.insert(col.to_string(), value);
        self
    }

    /// Required numeric field.
    pub(crate) fn required_number(&mut self, col: &str, src: &str) -> Result<&mut Self> {
        self.number(col, src);
        if self.out.get(col) == Some(&Value::Null) {
            return Err(MigrateError::transform(
                self.table,
                self.source_id.clone(),
                format!("missing required field {src}"),
            ));
        }
        Ok(self)
    }

    /// Boolean field; absent defaults to false.
    pub(crate) fn boolean(&mut self, col: &str, src: &str) -> &mut Self {
        let value = self
            .raw(src)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.out.insert(col.to_string(), Value::Bool(value));
        self
    }

    /// Opaque structured payload passed through untouched.
    pub(crate) fn payload(&mut self, col: &str, src: &str) -> &mut Self {
        let value = self.raw(src).cloned().unwrap_or(Value::Null);
        self.out.insert(col.to_string(), value);
        self
    }

    /// Foreign key rewritten through the identifier map. Absent, null, and
    /// unmapped references all degrade to null (the mapper logs unmapped
    /// ones); referential strictness belongs to the validator.
    pub(crate) fn foreign_key(&mut self, col: &str, src: &str) -> &mut Self {
        let value = match self.mapper.rewrite_fk(self.raw(src)) {
            Some(uuid) => Value::String(uuid.to_string()),
            None => Value::Null,
        };
        self.out.insert(col.to_string(), value);
        self
    }

    pub(crate) fn finish(self) -> Record {
        self.out
    }
}
