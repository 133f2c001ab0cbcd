use axum::Json;

use crate::labels::{catalog, Catalog};

pub async fn get_catalog() -> Json<Catalog> {
    Json(catalog())
}
