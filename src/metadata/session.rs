//! Seam to the external SQL client.
//!
//! The wire protocol client is an external collaborator: the bootstrap logic
//! only needs to run queries, execute statements and quote literals, so that
//! is all this trait exposes. Tests drive the whole provisioning protocol
//! through a scripted implementation.

use thiserror::Error;

/// Error reported by the metadata server, with the server error code so the
/// caller can recognize specific conditions (duplicate key in particular).
#[derive(Error, Debug, Clone)]
#[error("{message} ({code})")]
pub struct SessionError {
    pub code: u32,
    pub message: String,
}

/// Server error code for a duplicate-key violation.
pub const ER_DUP_ENTRY: u32 = 1062;

impl SessionError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.code == ER_DUP_ENTRY
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// A connected session against the metadata store.
///
/// Row values arrive as optional strings (SQL NULL maps to `None`); the
/// callback returns `false` to stop iteration early.
pub trait MetadataSession {
    /// Run a row-returning query, invoking `row_cb` once per row.
    fn query(
        &mut self,
        sql: &str,
        row_cb: &mut dyn FnMut(&[Option<String>]) -> bool,
    ) -> SessionResult<()>;

    /// Run a single-row query, returning the first row if any.
    fn query_one(&mut self, sql: &str) -> SessionResult<Option<Vec<Option<String>>>> {
        let mut first = None;
        self.query(sql, &mut |row| {
            first = Some(row.to_vec());
            false
        })?;
        Ok(first)
    }

    /// Execute a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> SessionResult<()>;

    /// Quote a string literal for inclusion in a statement.
    fn quote(&self, value: &str) -> String;
}

/// RAII transaction guard over a metadata session.
///
/// Every remote mutation of one bootstrap attempt runs inside a single
/// transaction; dropping the guard without `commit()` issues a best-effort
/// rollback so a failed attempt leaves the store unmodified.
pub struct Transaction<'a, 's> {
    session: &'a mut (dyn MetadataSession + 's),
    committed: bool,
}

impl<'a, 's> Transaction<'a, 's> {
    pub fn begin(session: &'a mut (dyn MetadataSession + 's)) -> SessionResult<Self> {
        session.execute("START TRANSACTION")?;
        Ok(Self {
            session,
            committed: false,
        })
    }

    pub fn session(&mut self) -> &mut (dyn MetadataSession + 's) {
        self.session
    }

    pub fn commit(mut self) -> SessionResult<()> {
        self.session.execute("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Transaction<'_, '_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.session.execute("ROLLBACK") {
                log::warn!("Could not roll back metadata transaction: {}", e);
            }
        }
    }
}
