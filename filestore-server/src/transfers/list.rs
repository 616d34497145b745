//! List handling

use crate::admission::{AdmissionController, OperationKind};
use crate::context::CallContext;
use crate::storage::{FileStore, StoredFile};

use super::error::TransferError;

/// List every stored file under a list permit
pub(crate) async fn handle_list(
    admission: &AdmissionController,
    store: &FileStore,
    ctx: &CallContext,
) -> Result<Vec<StoredFile>, TransferError> {
    let _permit = admission.acquire(OperationKind::List, ctx).await?;
    let files = store.list().await?;
    tracing::debug!(count = files.len(), "listed files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::admission::AdmissionLimits;

    #[tokio::test]
    async fn test_list_releases_permit_on_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("missing"), dir.path().join("staging"));
        let admission = AdmissionController::new(AdmissionLimits {
            create: 1,
            get: 1,
            list: 1,
        });

        let result = handle_list(&admission, &store, &CallContext::background()).await;
        assert!(matches!(result, Err(TransferError::Storage(_))));
        assert_eq!(admission.available(OperationKind::List), 1);
    }

    #[tokio::test]
    async fn test_list_returns_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("root"), dir.path().join("staging"));
        store.init().await.unwrap();
        std::fs::write(store.root().join("a"), b"a").unwrap();
        let admission = AdmissionController::new(AdmissionLimits {
            create: 1,
            get: 1,
            list: 1,
        });

        let files = handle_list(&admission, &store, &CallContext::background())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a");
    }
}
