//! Framework-neutral request handler.
//!
//! The host binding hands over (method, path, query-map, headers, body) and
//! gets back (status, headers, body). The pipeline inside is
//! parse -> validate -> plan -> execute -> format; each stage either
//! produces a typed value or a typed error, and errors become the standard
//! `{"error":{...}}` envelope.

use crate::batch;
use crate::config::ServiceConfig;
use crate::connection::{Connection, JsonRow, Queryable};
use crate::delta::{
    self, generate_delta_link, parse_delta_token, ChangeEvent, ChangeOp, DeltaStore, DeltaToken,
    DeltaTracker,
};
use crate::error::{Error, Result};
use crate::metadata::build_metadata_xml;
use crate::path::{parse_path, RoutePath};
use crate::plan::{build_count_query, build_select_query};
use crate::query::{parse_query, ExpandItem, Query};
use crate::schema::TableSchema;
use bytes::Bytes;
use http::StatusCode;
use indexmap::IndexMap;
use oxidata_response::{
    collection_envelope, entity_envelope, headers, nest_expanded_rows, to_bytes, ExpandPrefix,
};
use oxidata_sql::{DeleteStatement, InsertStatement, SqlParam, UpdateStatement};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, warn};

/// Characters escaped when rebuilding query strings for links.
const QUERY_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'&')
    .add(b'=')
    .add(b'#')
    .add(b'%')
    .add(b'+');

// ============================================================================
// Request / Response
// ============================================================================

/// A framework-neutral request.
#[derive(Clone, Debug)]
pub struct ServiceRequest {
    pub method: String,
    pub path: String,
    pub query: IndexMap<String, String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Honored only between batch operations, never mid-statement.
    pub deadline: Option<Instant>,
}

impl ServiceRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: IndexMap::new(),
            headers: Vec::new(),
            body: Bytes::new(),
            deadline: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A framework-neutral response.
#[derive(Clone, Debug)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn json(status: StatusCode, body: &JsonValue) -> Self {
        let bytes = to_bytes(body).unwrap_or_default();
        Self {
            status,
            headers: standard_headers(headers::CONTENT_TYPE_JSON),
            body: bytes,
        }
    }

    pub fn text(status: StatusCode, content_type: (&str, &str), body: String) -> Self {
        Self {
            status,
            headers: standard_headers(content_type),
            body: Bytes::from(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: vec![header(headers::ODATA_VERSION)],
            body: Bytes::new(),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        Self::json(error.status_code(), &error.to_json())
    }

    fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn header(pair: (&str, &str)) -> (String, String) {
    (pair.0.to_string(), pair.1.to_string())
}

fn standard_headers(content_type: (&str, &str)) -> Vec<(String, String)> {
    vec![header(content_type), header(headers::ODATA_VERSION)]
}

/// Parse a raw query string into a decoded parameter map.
pub fn parse_query_string(query: &str) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(decode_component(key), decode_component(value));
    }
    map
}

fn decode_component(raw: &str) -> String {
    let unplussed = raw.replace('+', " ");
    percent_decode_str(&unplussed)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or(unplussed)
}

// ============================================================================
// Service
// ============================================================================

/// The service core: schema, configuration, and change tracking.
pub struct Service {
    registry: crate::schema::SchemaRegistry,
    config: ServiceConfig,
    delta: DeltaTracker,
}

impl Service {
    pub fn new(registry: crate::schema::SchemaRegistry, config: ServiceConfig) -> Self {
        let delta = DeltaTracker::new(config.delta.max_changes);
        Self {
            registry,
            config,
            delta,
        }
    }

    pub fn registry(&self) -> &crate::schema::SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn delta(&self) -> &DeltaTracker {
        &self.delta
    }

    /// Re-seed the in-memory change log from the `delta_changes` table.
    pub async fn load_persisted_changes(&self, conn: &mut dyn Connection) -> Result<()> {
        if !self.config.delta.persist {
            return Ok(());
        }
        DeltaStore::ensure_schema(conn).await?;
        let events = DeltaStore::load_all(conn).await?;
        debug!(count = events.len(), "restoring persisted change events");
        self.delta.restore(events);
        Ok(())
    }

    /// Drop change events older than `max_age_ms`, in memory and (when
    /// persistence is on) in the `delta_changes` table. Returns how many
    /// in-memory events were removed.
    pub async fn cleanup_old_changes(
        &self,
        conn: &mut dyn Connection,
        max_age_ms: i64,
    ) -> Result<usize> {
        let removed = self.delta.cleanup_old_changes(max_age_ms);
        if self.config.delta.persist {
            DeltaStore::prune(conn, DeltaTracker::now_ms() - max_age_ms).await?;
        }
        Ok(removed)
    }

    /// Handle one request end to end.
    pub async fn handle(
        &self,
        conn: &mut dyn Connection,
        request: ServiceRequest,
    ) -> ServiceResponse {
        debug!(method = %request.method, path = %request.path, "request");
        match self.dispatch(conn, &request).await {
            Ok(response) => response,
            Err(error) => {
                if error.status_code().is_server_error() {
                    warn!(error = %error, "request failed");
                }
                ServiceResponse::from_error(&error)
            }
        }
    }

    async fn dispatch(
        &self,
        conn: &mut dyn Connection,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse> {
        let route = parse_path(&request.path, &self.config.service_root)?;

        match (request.method.as_str(), route) {
            ("GET", RoutePath::Metadata) => Ok(ServiceResponse::text(
                StatusCode::OK,
                headers::CONTENT_TYPE_XML,
                build_metadata_xml(&self.registry),
            )),
            ("POST", RoutePath::Batch) => self.handle_batch(conn, request).await,
            ("GET", RoutePath::Count { resource }) => {
                self.read_count(conn, &resource, &request.query).await
            }
            ("GET", RoutePath::Collection { resource }) => {
                self.read_collection(conn, &resource, &request.query).await
            }
            ("POST", RoutePath::Collection { resource }) => {
                self.create(conn, &resource, &request.body).await
            }
            ("GET", RoutePath::Entity { resource, id }) => {
                self.read_entity(conn, &resource, id).await
            }
            ("PUT", RoutePath::Entity { resource, id }) => {
                self.update(conn, &resource, id, &request.body).await
            }
            ("DELETE", RoutePath::Entity { resource, id }) => {
                self.delete(conn, &resource, id).await
            }
            ("GET", RoutePath::Navigation { resource, id, nav }) => {
                self.read_navigation(conn, &resource, id, &nav).await
            }
            (_, _) => Err(Error::MethodNotAllowed {
                method: request.method.clone(),
                path: request.path.clone(),
            }),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn read_collection(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        params: &IndexMap<String, String>,
    ) -> Result<ServiceResponse> {
        let query = parse_query(params)?;

        if let Some(token) = &query.delta_token {
            return self.delta_feed(resource, token);
        }

        let table = self.registry.resolve_resource(resource)?;
        let plan = build_select_query(&query, table, &self.registry, &self.config)?;
        debug!(sql = %plan.sql, "executing query");

        let rows = conn.fetch_all(&plan.sql, &plan.params).await?;
        let mut rows: Vec<JsonValue> = rows.into_iter().map(JsonValue::Object).collect();

        if let Some(expand) = &query.expand {
            nest_expanded_rows(&mut rows, &expand_prefixes(expand));
        }

        let count = if query.count {
            let count_plan = build_count_query(&query, table, &self.registry, &self.config)?;
            Some(self.run_count(conn, &count_plan).await?)
        } else {
            None
        };

        let next_link = self.next_link(resource, params, &query, rows.len());
        let delta_link = self.collection_delta_link(resource, params);

        let body = collection_envelope(
            format!("{}/$metadata#{}", self.config.context_base(), resource),
            rows,
            count,
            next_link,
            delta_link,
        );
        Ok(ServiceResponse::json(StatusCode::OK, &body))
    }

    async fn read_count(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        params: &IndexMap<String, String>,
    ) -> Result<ServiceResponse> {
        let query = parse_query(params)?;
        let table = self.registry.resolve_resource(resource)?;
        let plan = build_count_query(&query, table, &self.registry, &self.config)?;
        let count = self.run_count(conn, &plan).await?;

        Ok(ServiceResponse::text(
            StatusCode::OK,
            headers::CONTENT_TYPE_TEXT,
            count.to_string(),
        ))
    }

    async fn run_count(
        &self,
        conn: &mut dyn Connection,
        plan: &crate::plan::SqlPlan,
    ) -> Result<i64> {
        let row = conn.fetch_optional(&plan.sql, &plan.params).await?;
        Ok(row
            .and_then(|r| r.get("count").and_then(JsonValue::as_i64))
            .unwrap_or(0))
    }

    async fn read_entity(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        id: i64,
    ) -> Result<ServiceResponse> {
        let table = self.registry.resolve_resource(resource)?;
        let row = self
            .fetch_by_id(conn, table, id)
            .await?
            .ok_or(Error::EntityNotFound {
                resource: resource.to_string(),
                id,
            })?;

        let body = entity_envelope(
            format!("{}/$metadata#{}/$entity", self.config.context_base(), resource),
            JsonValue::Object(row),
        );
        Ok(ServiceResponse::json(StatusCode::OK, &body))
    }

    async fn read_navigation(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        id: i64,
        nav: &str,
    ) -> Result<ServiceResponse> {
        let table = self.registry.resolve_resource(resource)?;
        let fk = self.registry.resolve_navigation(resource, nav)?;
        let target = self.registry.resolve_resource(&fk.to_table)?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = (SELECT {} FROM {} WHERE {} = ?)",
            target.name,
            fk.to_column,
            fk.from_column,
            table.name,
            table.pk_name()
        );
        debug!(sql = %sql, "navigation query");

        let row = conn
            .fetch_optional(&sql, &[SqlParam::Int(id)])
            .await?
            .ok_or(Error::EntityNotFound {
                resource: resource.to_string(),
                id,
            })?;

        let body = entity_envelope(
            format!(
                "{}/$metadata#{}/$entity",
                self.config.context_base(),
                fk.to_table
            ),
            JsonValue::Object(row),
        );
        Ok(ServiceResponse::json(StatusCode::OK, &body))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    async fn create(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        body: &Bytes,
    ) -> Result<ServiceResponse> {
        let table = self.registry.resolve_resource(resource)?;
        let payload = parse_json_body(body)?;
        let (id, row) = self.insert_entity(conn, table, &payload).await?;

        self.record_change(
            conn,
            resource,
            id,
            ChangeOp::Create,
            Some(JsonValue::Object(row.clone())),
        )
        .await?;

        let body = entity_envelope(
            format!("{}/$metadata#{}/$entity", self.config.context_base(), resource),
            JsonValue::Object(row),
        );
        let location = format!("{}/{}({})", self.config.context_base(), resource, id);
        Ok(ServiceResponse::json(StatusCode::CREATED, &body).with_header("Location", location))
    }

    async fn update(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        id: i64,
        body: &Bytes,
    ) -> Result<ServiceResponse> {
        let table = self.registry.resolve_resource(resource)?;
        let payload = parse_json_body(body)?;
        let row = self
            .update_entity(conn, table, id, &payload)
            .await?
            .ok_or(Error::EntityNotFound {
                resource: resource.to_string(),
                id,
            })?;

        self.record_change(
            conn,
            resource,
            id,
            ChangeOp::Update,
            Some(JsonValue::Object(row.clone())),
        )
        .await?;

        let body = entity_envelope(
            format!("{}/$metadata#{}/$entity", self.config.context_base(), resource),
            JsonValue::Object(row),
        );
        Ok(ServiceResponse::json(StatusCode::OK, &body))
    }

    async fn delete(
        &self,
        conn: &mut dyn Connection,
        resource: &str,
        id: i64,
    ) -> Result<ServiceResponse> {
        let table = self.registry.resolve_resource(resource)?;
        if !self.delete_entity(conn, table, id).await? {
            return Err(Error::EntityNotFound {
                resource: resource.to_string(),
                id,
            });
        }

        // Emit only on an actual row deletion, never after a 404.
        self.record_change(conn, resource, id, ChangeOp::Delete, None)
            .await?;
        Ok(ServiceResponse::no_content())
    }

    // ========================================================================
    // Shared entity operations (also used by the batch executor)
    // ========================================================================

    pub(crate) async fn fetch_by_id<Q: Queryable + ?Sized>(
        &self,
        queryable: &mut Q,
        table: &TableSchema,
        id: i64,
    ) -> Result<Option<JsonRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            table.name,
            table.pk_name()
        );
        queryable.fetch_optional(&sql, &[SqlParam::Int(id)]).await
    }

    /// INSERT the body's columns filtered to schema columns, then return
    /// the stored row looked up by rowid.
    pub(crate) async fn insert_entity<Q: Queryable + ?Sized>(
        &self,
        queryable: &mut Q,
        table: &TableSchema,
        payload: &JsonValue,
    ) -> Result<(i64, JsonRow)> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::InvalidBody("expected a JSON object".into()))?;

        let mut stmt = InsertStatement::new(&table.name);
        for (key, value) in object {
            let column = self.config.db_field(key);
            if table.has_column(column) {
                stmt.value(column, SqlParam::from_json(value));
            }
        }
        if stmt.is_empty() {
            return Err(Error::InvalidBody("no recognized columns".into()));
        }

        let fragment = stmt.build();
        debug!(sql = %fragment.sql(), "insert");
        let result = queryable.execute(fragment.sql(), fragment.params()).await?;

        let id = result.last_insert_rowid;
        let row = self
            .fetch_by_id(queryable, table, id)
            .await?
            .ok_or_else(|| Error::Internal("inserted row not found".into()))?;
        Ok((id, row))
    }

    /// UPDATE by id. Returns the updated row, or None when nothing matched.
    pub(crate) async fn update_entity<Q: Queryable + ?Sized>(
        &self,
        queryable: &mut Q,
        table: &TableSchema,
        id: i64,
        payload: &JsonValue,
    ) -> Result<Option<JsonRow>> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::InvalidBody("expected a JSON object".into()))?;

        let pk = table.pk_name();
        let mut stmt = UpdateStatement::new(&table.name);
        for (key, value) in object {
            let column = self.config.db_field(key);
            if column != pk && table.has_column(column) {
                stmt.set(column, SqlParam::from_json(value));
            }
        }
        if stmt.is_empty() {
            return Err(Error::InvalidBody("no recognized columns".into()));
        }

        let mut by_id = oxidata_sql::SqlFragment::new();
        by_id.push(pk);
        by_id.push(" = ");
        by_id.push_param(SqlParam::Int(id));
        stmt.where_clause(by_id);

        let fragment = stmt.build();
        debug!(sql = %fragment.sql(), "update");
        let result = queryable.execute(fragment.sql(), fragment.params()).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.fetch_by_id(queryable, table, id).await
    }

    /// DELETE by id. Returns whether a row was removed.
    pub(crate) async fn delete_entity<Q: Queryable + ?Sized>(
        &self,
        queryable: &mut Q,
        table: &TableSchema,
        id: i64,
    ) -> Result<bool> {
        let mut by_id = oxidata_sql::SqlFragment::new();
        by_id.push(table.pk_name());
        by_id.push(" = ");
        by_id.push_param(SqlParam::Int(id));

        let mut stmt = DeleteStatement::new(&table.name);
        stmt.where_clause(by_id);

        let fragment = stmt.build();
        debug!(sql = %fragment.sql(), "delete");
        let result = queryable.execute(fragment.sql(), fragment.params()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Record a change event and write it through when persistence is on.
    pub(crate) async fn record_change<Q: Queryable + ?Sized>(
        &self,
        queryable: &mut Q,
        resource: &str,
        entity_id: i64,
        op: ChangeOp,
        data: Option<JsonValue>,
    ) -> Result<()> {
        if !self.config.delta.enabled {
            return Ok(());
        }

        let assigned = self.delta.track_change(
            resource,
            entity_id,
            op,
            DeltaTracker::now_ms(),
            data.clone(),
        )?;

        if self.config.delta.persist {
            let event = ChangeEvent {
                resource: resource.to_string(),
                entity_id,
                op,
                timestamp: assigned,
                data,
            };
            DeltaStore::persist(queryable, &event).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Delta and batch surfaces
    // ========================================================================

    fn delta_feed(&self, resource: &str, token: &str) -> Result<ServiceResponse> {
        if !self.config.delta.enabled {
            return Err(Error::InvalidQueryOption {
                option: "$deltatoken".into(),
                message: "change tracking is disabled".into(),
            });
        }
        self.registry.resolve_resource(resource)?;

        // Opaque custom tokens replay the full retained log.
        let since = match parse_delta_token(token)? {
            DeltaToken::Timestamp(timestamp) => timestamp,
            DeltaToken::Custom(_) => 0,
        };

        let events = self.delta.get_changes(resource, since);
        let body = delta::generate_delta_response(
            resource,
            &self.config.context_base(),
            &events,
            DeltaTracker::now_ms(),
        );
        Ok(ServiceResponse::json(StatusCode::OK, &body))
    }

    async fn handle_batch(
        &self,
        conn: &mut dyn Connection,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse> {
        let body = std::str::from_utf8(&request.body).map_err(|_| Error::InvalidBatchFormat)?;
        let operations = batch::parse_batch(body)?;
        if operations.len() > self.config.max_batch_operations {
            return Err(Error::BatchTooLarge(operations.len()));
        }

        let results = batch::execute_batch(self, conn, &operations, request.deadline).await?;
        Ok(batch::serialize_batch_response(&results))
    }

    // ========================================================================
    // Links
    // ========================================================================

    fn next_link(
        &self,
        resource: &str,
        params: &IndexMap<String, String>,
        query: &Query,
        returned: usize,
    ) -> Option<String> {
        let top = query.top?;
        if top == 0 || (returned as i64) < top {
            return None;
        }

        let next_skip = query.skip.unwrap_or(0) + top;
        let mut pairs: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| key.as_str() != "$skip" && key.as_str() != "$deltatoken")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        pairs.push(("$skip".into(), next_skip.to_string()));

        Some(format!(
            "{}/{}?{}",
            self.config.context_base(),
            resource,
            encode_pairs(&pairs)
        ))
    }

    fn collection_delta_link(
        &self,
        resource: &str,
        params: &IndexMap<String, String>,
    ) -> Option<String> {
        if !self.config.delta.enabled {
            return None;
        }

        let pairs: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| key.as_str() != "$deltatoken")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let existing = if pairs.is_empty() {
            None
        } else {
            Some(encode_pairs(&pairs))
        };

        Some(generate_delta_link(
            &self.config.context_base(),
            resource,
            DeltaTracker::now_ms(),
            existing.as_deref(),
            None,
        ))
    }
}

fn parse_json_body(body: &Bytes) -> Result<JsonValue> {
    if body.is_empty() {
        return Err(Error::InvalidBody("empty body".into()));
    }
    serde_json::from_slice(body).map_err(|e| Error::InvalidBody(e.to_string()))
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, QUERY_ENCODE),
                utf8_percent_encode(value, QUERY_ENCODE)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Flattened-alias nesting instructions for an expand tree, DFS order.
fn expand_prefixes(items: &[ExpandItem]) -> Vec<ExpandPrefix> {
    fn walk(items: &[ExpandItem], chain: &[String], out: &mut Vec<ExpandPrefix>) {
        for item in items {
            let mut path = chain.to_vec();
            path.push(item.path.clone());
            out.push(ExpandPrefix::new(path.clone()));
            walk(&item.nested, &path, out);
        }
    }

    let mut out = Vec::new();
    walk(items, &[], &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_query_string() {
        let map = parse_query_string("$filter=price%20gt%20100&$top=2");
        assert_eq!(map.get("$filter").unwrap(), "price gt 100");
        assert_eq!(map.get("$top").unwrap(), "2");
    }

    #[test]
    fn test_parse_query_string_plus_as_space() {
        let map = parse_query_string("$search=red+laptop");
        assert_eq!(map.get("$search").unwrap(), "red laptop");
    }

    #[test]
    fn test_expand_prefixes_dfs() {
        let mut outer = ExpandItem::new("customer");
        outer.nested = vec![ExpandItem::new("region")];
        let prefixes = expand_prefixes(&[outer, ExpandItem::new("items")]);

        assert_eq!(
            prefixes,
            vec![
                ExpandPrefix::new(vec!["customer".into()]),
                ExpandPrefix::new(vec!["customer".into(), "region".into()]),
                ExpandPrefix::new(vec!["items".into()]),
            ]
        );
    }

    #[test]
    fn test_encode_pairs() {
        let encoded = encode_pairs(&[("$filter".into(), "price gt 100".into())]);
        assert_eq!(encoded, "$filter=price%20gt%20100");
    }
}
