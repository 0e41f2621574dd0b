use async_trait::async_trait;
use tracing::debug;

use crate::entry::RawEntry;
use crate::error::DirectoryError;
use crate::filter::Filter;

/// Attribute name with its values, in the order they should be written.
pub type Attributes = Vec<(String, Vec<String>)>;

/// One bound session with the directory.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Subtree search below `base`, returning only the requested attributes.
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attrs: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError>;

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError>;

    /// Replace each listed attribute's values.
    async fn modify(&mut self, dn: &str, replace: Attributes) -> Result<(), DirectoryError>;

    async fn delete(&mut self, dn: &str) -> Result<(), DirectoryError>;

    async fn close(&mut self) -> Result<(), DirectoryError>;
}

/// Opens a fresh connection bound with the service credentials.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// Unbind and drop a connection. Failing to unbind is not an error for the caller.
pub(crate) async fn release(mut conn: Box<dyn DirectoryConnection>) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "failed to unbind directory connection");
    }
}
