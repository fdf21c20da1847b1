//! Order documents stored on local disk

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::{CompanyConfig, Config};
use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::client::{Client, CLIENT_COLUMNS};
use crate::services::order::{Order, OrderLine, LINE_SELECT, ORDER_SELECT};
use crate::services::pdf;
use shared::models::{sanitize_file_name, AuditAction, DocumentType};

/// Document service
#[derive(Clone)]
pub struct DocumentService {
    db: PgPool,
    root: PathBuf,
    max_upload_bytes: usize,
    company: CompanyConfig,
}

/// File attached to an order
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Relative to the documents directory
    pub file_path: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub doc_type: DocumentType,
    pub number: Option<String>,
    pub added_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub sent_to_agency: bool,
    pub sent_to_agency_at: Option<DateTime<Utc>>,
}

const DOCUMENT_COLUMNS: &str = "id, order_id, file_path, name, doc_type, number, added_at, user_id, \
     sent_to_agency, sent_to_agency_at";

/// A parsed upload
#[derive(Debug)]
pub struct NewDocument {
    pub name: String,
    pub doc_type: DocumentType,
    pub number: Option<String>,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// File contents ready to be served
#[derive(Debug)]
pub struct DocumentFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Guess a content type from the file extension
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Name a stored file is served under: the part after the storage prefix
fn display_name(file_path: &str) -> String {
    let base = file_path.rsplit('/').next().unwrap_or(file_path);
    base.split_once("__")
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_else(|| base.to_string())
}

/// Write bytes under `{root}/{order_number}/` and return the path relative to `root`
async fn store_file(root: &Path, order_number: &str, file_name: &str, bytes: &[u8]) -> AppResult<String> {
    let relative = format!(
        "{}/{}__{}",
        sanitize_file_name(order_number),
        Uuid::new_v4().simple(),
        sanitize_file_name(file_name)
    );
    let path = root.join(&relative);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;
    }
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;
    Ok(relative)
}

/// Removes a stored file when its row could not be written
async fn discard_on_error<T>(root: &Path, file_path: &str, result: AppResult<T>) -> AppResult<T> {
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(root.join(file_path)).await {
            tracing::warn!(path = %file_path, error = %e, "Could not remove orphan document file");
        }
    }
    result
}

async fn read_file(root: &Path, file_path: &str) -> AppResult<DocumentFile> {
    let bytes = match tokio::fs::read(root.join(file_path)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Document file".to_string()));
        }
        Err(e) => return Err(AppError::StorageError(e.to_string())),
    };
    let file_name = display_name(file_path);
    Ok(DocumentFile {
        content_type: content_type_for(&file_name),
        file_name,
        bytes,
    })
}

impl DocumentService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            root: PathBuf::from(&config.storage.documents_dir),
            max_upload_bytes: config.storage.max_upload_bytes,
            company: config.company.clone(),
        }
    }

    /// Documents attached to an order, newest first
    pub async fn list_for_order(db: &PgPool, order_id: Uuid) -> AppResult<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE order_id = $1 ORDER BY added_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(db)
        .await?;
        Ok(documents)
    }

    pub async fn get(&self, document_id: Uuid) -> AppResult<Document> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Document".to_string()))
    }

    async fn order_number(&self, order_id: Uuid) -> AppResult<String> {
        sqlx::query_scalar::<_, String>("SELECT number FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn insert(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        file_path: &str,
        name: &str,
        doc_type: DocumentType,
        number: Option<&str>,
    ) -> AppResult<Document> {
        let mut tx = self.db.begin().await?;

        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (order_id, file_path, name, doc_type, number, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(order_id)
        .bind(file_path)
        .bind(name)
        .bind(doc_type.as_str())
        .bind(number)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Create, "Document", document.id, name)
                .with_details(json!({ "order_id": order_id, "doc_type": doc_type })),
        )
        .await?;

        tx.commit().await?;
        Ok(document)
    }

    /// Attach an uploaded file to an order
    pub async fn upload(&self, user_id: Uuid, order_id: Uuid, upload: NewDocument) -> AppResult<Document> {
        let name = upload.name.trim();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(AppError::validation(
                "name",
                "Document name must be 1-100 characters",
                "Le nom du document doit contenir 1 à 100 caractères",
            ));
        }
        if upload.bytes.is_empty() {
            return Err(AppError::validation("file", "File is empty", "Le fichier est vide"));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(AppError::validation(
                "file",
                "File is too large",
                "Le fichier est trop volumineux",
            ));
        }

        let order_number = self.order_number(order_id).await?;
        let file_path = store_file(&self.root, &order_number, &upload.file_name, &upload.bytes).await?;

        let number = upload.number.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let inserted = self
            .insert(user_id, order_id, &file_path, name, upload.doc_type, number)
            .await;
        let document = discard_on_error(&self.root, &file_path, inserted).await?;

        tracing::info!(order = %order_number, %file_path, "Document uploaded");
        Ok(document)
    }

    async fn read(&self, document: &Document) -> AppResult<DocumentFile> {
        read_file(&self.root, &document.file_path).await.inspect_err(|e| {
            if matches!(e, AppError::NotFound(_)) {
                tracing::warn!(document = %document.id, path = %document.file_path, "Document file missing");
            }
        })
    }

    /// File contents of a document
    pub async fn download(&self, document_id: Uuid) -> AppResult<DocumentFile> {
        let document = self.get(document_id).await?;
        self.read(&document).await
    }

    /// Remove the file, then the row
    pub async fn delete(&self, user_id: Uuid, document_id: Uuid) -> AppResult<()> {
        let document = self.get(document_id).await?;

        match tokio::fs::remove_file(self.root.join(&document.file_path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::StorageError(e.to_string())),
        }

        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.db)
            .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Delete, "Document", document_id, &document.name),
        )
        .await
    }

    /// Flag a document as handed to the customs agency
    pub async fn mark_sent_to_agency(&self, user_id: Uuid, document_id: Uuid) -> AppResult<Document> {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents
            SET sent_to_agency = true, sent_to_agency_at = COALESCE(sent_to_agency_at, NOW())
            WHERE id = $1
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Document".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Update, "Document", document_id, &document.name)
                .with_details(json!({ "sent_to_agency": true })),
        )
        .await?;

        Ok(document)
    }

    async fn purchase_order(&self, order_id: Uuid) -> AppResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            SELECT {} FROM documents
            WHERE order_id = $1 AND doc_type = $2
            ORDER BY added_at DESC
            LIMIT 1
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(order_id)
        .bind(DocumentType::PurchaseOrder.as_str())
        .fetch_optional(&self.db)
        .await?;
        Ok(document)
    }

    /// Render the purchase order PDF and store it as an order document
    pub async fn generate_purchase_order(&self, user_id: Uuid, order_id: Uuid) -> AppResult<Document> {
        if self.purchase_order(order_id).await?.is_some() {
            return Err(AppError::Conflict {
                resource: "purchase_order".to_string(),
                message: "A purchase order already exists for this order".to_string(),
                message_fr: "Un bon de commande existe déjà pour cette commande".to_string(),
            });
        }

        let order = sqlx::query_as::<_, Order>(&format!("{} WHERE o.id = $1", ORDER_SELECT))
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(order.client_id)
        .fetch_one(&self.db)
        .await?;

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "{} WHERE l.order_id = $1 ORDER BY l.created_at",
            LINE_SELECT
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let bytes = pdf::render_purchase_order(&self.company, &order, &client, &lines)?;
        let file_name = format!("purchase_order_{}.pdf", order.number);
        let file_path = store_file(&self.root, &order.number, &file_name, &bytes).await?;

        let inserted = self
            .insert(
                user_id,
                order_id,
                &file_path,
                &format!("Purchase order {}", order.number),
                DocumentType::PurchaseOrder,
                Some(&order.number),
            )
            .await;
        let document = discard_on_error(&self.root, &file_path, inserted).await?;

        tracing::info!(order = %order.number, "Purchase order generated");
        Ok(document)
    }

    /// Serve the order's purchase order, generating it first when missing
    pub async fn download_purchase_order(&self, user_id: Uuid, order_id: Uuid) -> AppResult<DocumentFile> {
        let document = match self.purchase_order(order_id).await? {
            Some(document) => document,
            None => self.generate_purchase_order(user_id, order_id).await?,
        };
        self.read(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("bl.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("archive.tar.gz"), "application/octet-stream");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn stored_prefix_is_hidden_from_the_served_name() {
        assert_eq!(
            display_name("CMD20240101/3f2a9c__certificate.pdf"),
            "certificate.pdf"
        );
        assert_eq!(display_name("legacy.pdf"), "legacy.pdf");
    }

    #[test]
    fn stored_files_read_back_under_their_upload_name() {
        let root = std::env::temp_dir().join(format!("fishflow-docs-{}", Uuid::new_v4().simple()));
        let relative = tokio_test::block_on(store_file(&root, "CMD20240101", "bill of lading.pdf", b"%PDF-1.5"))
            .unwrap();

        assert!(relative.starts_with("CMD20240101/"));
        let file = tokio_test::block_on(read_file(&root, &relative)).unwrap();
        assert_eq!(file.file_name, "bill_of_lading.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.bytes, b"%PDF-1.5");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn failed_insert_leaves_no_file_behind() {
        let root = std::env::temp_dir().join(format!("fishflow-docs-{}", Uuid::new_v4().simple()));
        let relative = tokio_test::block_on(store_file(&root, "CMD20240101", "packing list.pdf", b"%PDF-1.5"))
            .unwrap();

        let failed: AppResult<()> = Err(AppError::Internal("audit insert failed".to_string()));
        let err = tokio_test::block_on(discard_on_error(&root, &relative, failed)).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let gone = tokio_test::block_on(read_file(&root, &relative)).unwrap_err();
        assert!(matches!(gone, AppError::NotFound(_)));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn successful_insert_keeps_the_file() {
        let root = std::env::temp_dir().join(format!("fishflow-docs-{}", Uuid::new_v4().simple()));
        let relative = tokio_test::block_on(store_file(&root, "CMD20240102", "invoice.pdf", b"%PDF-1.5"))
            .unwrap();

        let kept = tokio_test::block_on(discard_on_error(&root, &relative, Ok(7))).unwrap();
        assert_eq!(kept, 7);
        assert!(tokio_test::block_on(read_file(&root, &relative)).is_ok());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_file_is_not_found() {
        let root = std::env::temp_dir().join("fishflow-docs-missing");
        let err = tokio_test::block_on(read_file(&root, "CMD1/none__gone.pdf")).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
