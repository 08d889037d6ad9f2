//! Scripted in-memory `Connection` for end-to-end handler tests.

use async_trait::async_trait;
use oxidata_core::connection::{Connection, ExecResult, JsonRow, Queryable, Transaction};
use oxidata_core::{Error, Result};
use oxidata_sql::SqlParam;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted response, consumed in call order.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Rows(Vec<JsonRow>),
    Exec(ExecResult),
    Fail(String),
}

#[derive(Debug, Default)]
struct Inner {
    responses: VecDeque<MockResponse>,
    log: Vec<(String, Vec<SqlParam>)>,
    committed: bool,
    rolled_back: bool,
}

/// A connection that replays scripted responses and records every call.
#[derive(Clone)]
pub struct MockConnection {
    inner: Arc<Mutex<Inner>>,
    transactions: bool,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transactions: true,
        }
    }

    pub fn without_transactions() -> Self {
        Self {
            transactions: false,
            ..Self::new()
        }
    }

    pub fn push(&self, response: MockResponse) {
        self.inner.lock().unwrap().responses.push_back(response);
    }

    pub fn push_rows(&self, rows: Vec<JsonRow>) {
        self.push(MockResponse::Rows(rows));
    }

    pub fn push_exec(&self, rows_affected: u64, last_insert_rowid: i64) {
        self.push(MockResponse::Exec(ExecResult {
            rows_affected,
            last_insert_rowid,
        }));
    }

    pub fn push_fail(&self, message: &str) {
        self.push(MockResponse::Fail(message.to_string()));
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn committed(&self) -> bool {
        self.inner.lock().unwrap().committed
    }

    pub fn rolled_back(&self) -> bool {
        self.inner.lock().unwrap().rolled_back
    }
}

pub fn row(pairs: &[(&str, serde_json::Value)]) -> JsonRow {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn next(inner: &Arc<Mutex<Inner>>, sql: &str, params: &[SqlParam]) -> Result<MockResponse> {
    let mut inner = inner.lock().unwrap();
    inner.log.push((sql.to_string(), params.to_vec()));
    match inner.responses.pop_front() {
        Some(MockResponse::Fail(message)) => Err(Error::Database(message)),
        Some(response) => Ok(response),
        None => Ok(MockResponse::Rows(Vec::new())),
    }
}

#[async_trait]
impl Queryable for MockConnection {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonRow>> {
        match next(&self.inner, sql, params)? {
            MockResponse::Rows(rows) => Ok(rows),
            MockResponse::Exec(_) => Ok(Vec::new()),
            MockResponse::Fail(_) => unreachable!(),
        }
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<JsonRow>> {
        match next(&self.inner, sql, params)? {
            MockResponse::Rows(rows) => Ok(rows.into_iter().next()),
            MockResponse::Exec(_) => Ok(None),
            MockResponse::Fail(_) => unreachable!(),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<ExecResult> {
        match next(&self.inner, sql, params)? {
            MockResponse::Exec(result) => Ok(result),
            MockResponse::Rows(_) => Ok(ExecResult::default()),
            MockResponse::Fail(_) => unreachable!(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn exec(&mut self, sql: &str) -> Result<()> {
        let _ = next(&self.inner, sql, &[])?;
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn Transaction + 'a>> {
        Ok(Box::new(MockTransaction {
            inner: Arc::clone(&self.inner),
        }))
    }
}

pub struct MockTransaction {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Queryable for MockTransaction {
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<JsonRow>> {
        match next(&self.inner, sql, params)? {
            MockResponse::Rows(rows) => Ok(rows),
            MockResponse::Exec(_) => Ok(Vec::new()),
            MockResponse::Fail(_) => unreachable!(),
        }
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<JsonRow>> {
        match next(&self.inner, sql, params)? {
            MockResponse::Rows(rows) => Ok(rows.into_iter().next()),
            MockResponse::Exec(_) => Ok(None),
            MockResponse::Fail(_) => unreachable!(),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<ExecResult> {
        match next(&self.inner, sql, params)? {
            MockResponse::Exec(result) => Ok(result),
            MockResponse::Rows(_) => Ok(ExecResult::default()),
            MockResponse::Fail(_) => unreachable!(),
        }
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.lock().unwrap().committed = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.lock().unwrap().rolled_back = true;
        Ok(())
    }
}
