//! Batch execution.
//!
//! One transaction surrounds the whole changeset. Client-level outcomes
//! (404, 405, 400) are per-operation responses; database and internal
//! failures abort the transaction and stamp every operation 500. Change
//! events are buffered and flushed to the tracker only after commit, so a
//! rolled-back changeset observes none.

use super::parser::{BatchBody, BatchOperation};
use super::BatchResult;
use crate::connection::{Connection, Queryable};
use crate::delta::ChangeOp;
use crate::error::{Error, Result};
use crate::handler::{parse_query_string, Service};
use crate::path::{parse_path, RoutePath};
use crate::plan::build_select_query;
use crate::query::parse_query;
use http::StatusCode;
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, warn};

/// A change event awaiting commit.
struct PendingChange {
    resource: String,
    entity_id: i64,
    op: ChangeOp,
    data: Option<JsonValue>,
}

/// Execute parsed operations as one changeset.
pub async fn execute_batch(
    service: &Service,
    conn: &mut dyn Connection,
    operations: &[BatchOperation],
    deadline: Option<Instant>,
) -> Result<Vec<BatchResult>> {
    if operations.is_empty() {
        return Ok(Vec::new());
    }

    if !conn.supports_transactions() {
        return execute_without_transaction(service, conn, operations, deadline).await;
    }

    let mut pending: Vec<PendingChange> = Vec::new();
    let mut results = Vec::with_capacity(operations.len());
    let mut abort: Option<Error> = None;

    {
        let mut tx = match conn.begin().await {
            Ok(tx) => tx,
            Err(error) => {
                warn!(error = %error, "failed to open batch transaction");
                let failure = Error::TransactionAborted(error.to_string());
                return Ok(operations
                    .iter()
                    .map(|_| BatchResult::from_error(&failure))
                    .collect());
            }
        };

        for operation in operations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                abort = Some(Error::DeadlineExceeded);
                break;
            }

            match execute_operation(service, &mut *tx, operation, &mut pending).await {
                Ok(result) => results.push(result),
                Err(error) if error.is_client_error() => {
                    results.push(BatchResult::from_error(&error))
                }
                Err(error) => {
                    abort = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = &abort {
            warn!(error = %error, "batch aborted, rolling back changeset");
            let _ = tx.rollback().await;
        } else if let Err(error) = tx.commit().await {
            warn!(error = %error, "batch commit failed");
            abort = Some(error);
        }
    }

    if let Some(error) = abort {
        let failure = Error::TransactionAborted(error.to_string());
        return Ok(operations
            .iter()
            .map(|_| BatchResult::from_error(&failure))
            .collect());
    }

    flush_pending(service, conn, pending).await;
    Ok(results)
}

/// Sequential execution without rollback, for connections that cannot open
/// a transaction. Errors affect only their own operation.
async fn execute_without_transaction(
    service: &Service,
    conn: &mut dyn Connection,
    operations: &[BatchOperation],
    deadline: Option<Instant>,
) -> Result<Vec<BatchResult>> {
    warn!("connection lacks transactions; executing changeset without rollback");

    let mut pending: Vec<PendingChange> = Vec::new();
    let mut results = Vec::with_capacity(operations.len());

    for operation in operations {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            results.push(BatchResult::from_error(&Error::DeadlineExceeded));
            continue;
        }

        match execute_operation(service, conn, operation, &mut pending).await {
            Ok(result) => results.push(result),
            Err(error) => results.push(BatchResult::from_error(&error)),
        }
    }

    flush_pending(service, conn, pending).await;
    Ok(results)
}

async fn flush_pending(
    service: &Service,
    conn: &mut dyn Connection,
    pending: Vec<PendingChange>,
) {
    for change in pending {
        if let Err(error) = service
            .record_change(
                conn,
                &change.resource,
                change.entity_id,
                change.op,
                change.data,
            )
            .await
        {
            warn!(error = %error, resource = %change.resource, "failed to record change event");
        }
    }
}

async fn execute_operation<Q: Queryable + ?Sized>(
    service: &Service,
    queryable: &mut Q,
    operation: &BatchOperation,
    pending: &mut Vec<PendingChange>,
) -> Result<BatchResult> {
    debug!(method = %operation.method, url = %operation.url, "batch operation");

    let (path, query_string) = operation
        .url
        .split_once('?')
        .unwrap_or((operation.url.as_str(), ""));
    let params = parse_query_string(query_string);
    let route = parse_path(path, &service.config().service_root)?;

    match (operation.method.as_str(), route) {
        ("GET", RoutePath::Collection { resource }) => {
            let query = parse_query(&params)?;
            let table = service.registry().resolve_resource(&resource)?;
            let plan = build_select_query(&query, table, service.registry(), service.config())?;
            let rows = queryable.fetch_all(&plan.sql, &plan.params).await?;
            let value: Vec<JsonValue> = rows.into_iter().map(JsonValue::Object).collect();
            Ok(BatchResult::json(
                StatusCode::OK,
                serde_json::json!({ "value": value }),
            ))
        }
        ("GET", RoutePath::Entity { resource, id }) => {
            let table = service.registry().resolve_resource(&resource)?;
            let row = service
                .fetch_by_id(queryable, table, id)
                .await?
                .ok_or(Error::EntityNotFound { resource, id })?;
            Ok(BatchResult::json(StatusCode::OK, JsonValue::Object(row)))
        }
        ("POST", RoutePath::Collection { resource }) => {
            let body = operation
                .body
                .as_ref()
                .and_then(BatchBody::as_json)
                .ok_or_else(|| Error::InvalidBody("expected a JSON object".into()))?;

            let table = service.registry().resolve_resource(&resource)?;
            let (id, row) = service.insert_entity(queryable, table, body).await?;

            pending.push(PendingChange {
                resource,
                entity_id: id,
                op: ChangeOp::Create,
                data: Some(JsonValue::Object(row.clone())),
            });
            Ok(BatchResult::json(
                StatusCode::CREATED,
                JsonValue::Object(row),
            ))
        }
        ("PUT", RoutePath::Entity { resource, id }) => {
            let body = operation
                .body
                .as_ref()
                .and_then(BatchBody::as_json)
                .ok_or_else(|| Error::InvalidBody("expected a JSON object".into()))?;

            let table = service.registry().resolve_resource(&resource)?;
            let row = service
                .update_entity(queryable, table, id, body)
                .await?
                .ok_or_else(|| Error::EntityNotFound {
                    resource: resource.clone(),
                    id,
                })?;

            pending.push(PendingChange {
                resource,
                entity_id: id,
                op: ChangeOp::Update,
                data: Some(JsonValue::Object(row.clone())),
            });
            Ok(BatchResult::json(StatusCode::OK, JsonValue::Object(row)))
        }
        ("DELETE", RoutePath::Entity { resource, id }) => {
            let table = service.registry().resolve_resource(&resource)?;
            if !service.delete_entity(queryable, table, id).await? {
                return Err(Error::EntityNotFound { resource, id });
            }

            pending.push(PendingChange {
                resource,
                entity_id: id,
                op: ChangeOp::Delete,
                data: None,
            });
            Ok(BatchResult::no_content())
        }
        // PATCH parses but does not execute.
        ("PATCH", _) => Ok(BatchResult::from_error(&Error::MethodNotAllowed {
            method: "PATCH".into(),
            path: operation.url.clone(),
        })),
        (method, _) => Err(Error::MethodNotAllowed {
            method: method.to_string(),
            path: operation.url.clone(),
        }),
    }
}
