use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::StoredObject;

/// Externally visible summary of a document's processing outcome. Kept on
/// the document record itself, decoupled from queue internals, so status
/// queries never have to look at job state.
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Processing => "processing",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

stored_object!(Document, "document", {
    title: String,
    description: Option<String>,
    file_path: String,
    owner_id: String,
    ingestion_status: IngestionStatus
});

impl Document {
    pub fn new(
        title: String,
        description: Option<String>,
        file_path: String,
        owner_id: String,
    ) -> Self {
        let now = chrono::Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            file_path,
            owner_id,
            ingestion_status: IngestionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create_and_add_to_db(
        title: String,
        description: Option<String>,
        file_path: String,
        owner_id: String,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        let document = Self::new(title, description, file_path, owner_id);
        db.store_item(document.clone()).await?;
        Ok(document)
    }

    pub async fn find(db: &SurrealDbClient, id: &str) -> Result<Option<Document>, AppError> {
        Ok(db.get_item::<Document>(id).await?)
    }

    /// Overwrites the document's ingestion status, last writer wins. Fails
    /// with `NotFound` if no such document was ever registered.
    pub async fn set_ingestion_status(
        db: &SurrealDbClient,
        id: &str,
        status: IngestionStatus,
    ) -> Result<Document, AppError> {
        const SET_STATUS_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET ingestion_status = $status,
                updated_at = $now
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(SET_STATUS_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("status", status.as_str()))
            .bind((
                "now",
                surrealdb::sql::Datetime::from(chrono::Utc::now()),
            ))
            .await?;

        let updated: Option<Document> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("Document not found: {id}")))
    }

    pub async fn ingestion_status(
        db: &SurrealDbClient,
        id: &str,
    ) -> Result<IngestionStatus, AppError> {
        let document = Self::find(db, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document not found: {id}")))?;
        Ok(document.ingestion_status)
    }
}
