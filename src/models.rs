use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{is_staff_role, CaseStatus};
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_staff(&self) -> bool {
        is_staff_role(&self.role)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = cases)]
#[diesel(belongs_to(User, foreign_key = responsible_id))]
pub struct Case {
    pub id: Uuid,
    pub case_type: String,
    pub rol: String,
    pub claimant: String,
    pub respondent: Option<String>,
    pub tribunal: String,
    pub filed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub notified_on: Option<NaiveDate>,
    pub status: String,
    pub subject: String,
    pub notes: Option<String>,
    pub responsible_id: Uuid,
    pub urgent: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Case {
    pub fn is_in_process(&self) -> bool {
        self.status == CaseStatus::InProcess.as_str()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cases)]
pub struct NewCase {
    pub id: Uuid,
    pub case_type: String,
    pub rol: String,
    pub claimant: String,
    pub respondent: Option<String>,
    pub tribunal: String,
    pub filed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub notified_on: Option<NaiveDate>,
    pub status: String,
    pub subject: String,
    pub notes: Option<String>,
    pub responsible_id: Uuid,
    pub urgent: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = case_documents)]
#[diesel(belongs_to(Case))]
pub struct CaseDocument {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub storage_key: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_documents)]
pub struct NewCaseDocument {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub storage_key: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = alerts)]
#[diesel(belongs_to(Case))]
pub struct Alert {
    pub id: Uuid,
    pub case_id: Uuid,
    pub alert_type: String,
    pub message: String,
    pub fire_at: NaiveDateTime,
    pub sent: bool,
    pub sent_at: Option<NaiveDateTime>,
    pub read: bool,
    pub send_email: bool,
    pub recipient_email: Option<String>,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub dispatched_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = alerts)]
pub struct NewAlert {
    pub id: Uuid,
    pub case_id: Uuid,
    pub alert_type: String,
    pub message: String,
    pub fire_at: NaiveDateTime,
    pub send_email: bool,
    pub recipient_email: Option<String>,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = movements)]
#[diesel(belongs_to(Case))]
pub struct Movement {
    pub id: Uuid,
    pub case_id: Uuid,
    pub occurred_at: NaiveDateTime,
    pub description: String,
    pub author_id: Uuid,
    pub important: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = movements)]
pub struct NewMovement {
    pub id: Uuid,
    pub case_id: Uuid,
    pub occurred_at: NaiveDateTime,
    pub description: String,
    pub author_id: Uuid,
    pub important: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
