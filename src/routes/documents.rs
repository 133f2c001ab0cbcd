use std::{path::Path as FsPath, time::Duration};

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use diesel::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cases::load_visible_case;
use super::to_iso;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Case, CaseDocument, NewCaseDocument};
use crate::schema::{case_documents, cases};
use crate::state::AppState;
use crate::storage::StoredFile;
use crate::validation::{optional_text, required_text, validate_document_upload};

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 2000;

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

fn derive_document_title(original: &str) -> String {
    let trimmed = original.trim();
    FsPath::new(trimmed)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn storage_key(case_id: Uuid, document_id: Uuid, extension: &str) -> String {
    format!("cases/{case_id}/documents/{document_id}.{extension}")
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_at: String,
}

impl From<CaseDocument> for DocumentResponse {
    fn from(doc: CaseDocument) -> Self {
        Self {
            id: doc.id,
            case_id: doc.case_id,
            title: doc.title,
            original_name: doc.original_name,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            description: doc.description,
            uploaded_by: doc.uploaded_by,
            uploaded_at: to_iso(doc.uploaded_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}

pub async fn list_case_documents(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;
    let case = load_visible_case(&mut conn, case_id, &user.actor())?;
    let rows: Vec<CaseDocument> = case_documents::table
        .filter(case_documents::case_id.eq(case.id))
        .order(case_documents::uploaded_at.desc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn upload_case_document(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let case = {
        let mut conn = state.db()?;
        load_visible_case(&mut conn, case_id, &user.actor())?
    };

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid title: {err}"))
                })?);
            }
            Some("description") => {
                description = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid description: {err}"))
                })?);
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::invalid("file", "file field is required"))?;
    let original_name = original_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::invalid("file", "filename is required"))?;
    let extension = validate_document_upload(&original_name, file_bytes.len())?;

    let title = match title.filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => raw,
        None => derive_document_title(&original_name),
    };
    let title = required_text("title", &title, MAX_TITLE_CHARS)?;
    let description = optional_text("description", description.as_deref(), Some(MAX_DESCRIPTION_CHARS))?;
    let content_type = content_type
        .filter(|value| value != "application/octet-stream")
        .or_else(|| {
            mime_guess::from_path(&original_name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        });

    let document_id = Uuid::new_v4();
    let key = storage_key(case.id, document_id, &extension);
    let size_bytes = file_bytes.len() as i64;

    state
        .documents
        .save(
            &key,
            StoredFile {
                bytes: file_bytes,
                content_type: content_type.clone(),
                content_disposition: inline_content_disposition(&original_name),
            },
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %key, "failed to store document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let new_document = NewCaseDocument {
        id: document_id,
        case_id: case.id,
        title,
        storage_key: key.clone(),
        original_name,
        content_type,
        size_bytes,
        description,
        uploaded_by: user.user_id,
    };
    let inserted = state.db().and_then(|mut conn| {
        diesel::insert_into(case_documents::table)
            .values(&new_document)
            .get_result::<CaseDocument>(&mut conn)
            .map_err(AppError::from)
    });
    let document = match inserted {
        Ok(document) => document,
        Err(err) => {
            if let Err(cleanup) = state.documents.remove(&key).await {
                warn!(error = %cleanup, key = %key, "failed to remove orphaned document object");
            }
            return Err(err);
        }
    };

    info!(
        document_id = %document.id,
        case_id = %case.id,
        size_bytes,
        "document uploaded"
    );
    Ok((StatusCode::CREATED, Json(document.into())))
}

fn load_visible_document(
    state: &AppState,
    document_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<CaseDocument> {
    let mut conn = state.db()?;
    let (document, case): (CaseDocument, Case) = case_documents::table
        .inner_join(cases::table)
        .filter(case_documents::id.eq(document_id))
        .select((case_documents::all_columns, cases::all_columns))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if !user.actor().can_access(&case) {
        return Err(AppError::not_found());
    }
    Ok(document)
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = load_visible_document(&state, document_id, &user)?;

    let presigned_url = state
        .documents
        .download_url(
            &document.storage_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(DocumentDownloadResponse {
        url: presigned_url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        filename: document.original_name,
        content_type: document.content_type,
        size_bytes: document.size_bytes,
    }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let document = load_visible_document(&state, document_id, &user)?;
    {
        let mut conn = state.db()?;
        diesel::delete(case_documents::table.find(document.id)).execute(&mut conn)?;
    }

    if let Err(err) = state.documents.remove(&document.storage_key).await {
        warn!(error = %err, key = %document.storage_key, "failed to delete document object");
    }
    info!(document_id = %document.id, case_id = %document.case_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}
