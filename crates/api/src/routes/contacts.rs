//! Address book and contact groups.

use axum::extract::{Path, State};
use axum::Json;
use database::models::ContactSource;
use database::validation::validate_label;
use database::{contact, Contact, ContactGroup};
use serde::{Deserialize, Serialize};

use crate::auth::DashboardUser;
use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub success: bool,
    pub contacts: Vec<Contact>,
}

pub async fn list(State(state): State<AppState>, user: DashboardUser) -> Result<Json<ContactsResponse>> {
    let contacts = contact::list_contacts(state.db.pool(), user.id()).await?;
    Ok(Json(ContactsResponse {
        success: true,
        contacts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateContactBody {
    pub phone: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub contact: Contact,
}

/// Add a contact, or rename an existing one with the same number.
pub async fn create(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<CreateContactBody>,
) -> Result<Json<ContactResponse>> {
    let phone = phone::normalize(&body.phone, state.dial_prefix())
        .ok_or_else(|| ApiError::InvalidRecipient(vec![body.phone.clone()]))?;
    let name = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Some(name) = name {
        validate_label("name", name)?;
    }

    let contact = contact::upsert_contact(state.db.pool(), user.id(), &phone, name, ContactSource::Manual).await?;
    Ok(Json(ContactResponse {
        success: true,
        contact,
    }))
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

pub async fn remove(State(state): State<AppState>, user: DashboardUser, Path(id): Path<i64>) -> Result<Json<Ack>> {
    contact::delete_contact(state.db.pool(), user.id(), id).await?;
    Ok(Json(Ack { success: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: ContactGroup,
    pub member_count: i64,
}

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub success: bool,
    pub groups: Vec<GroupSummary>,
}

pub async fn list_groups(State(state): State<AppState>, user: DashboardUser) -> Result<Json<GroupsResponse>> {
    let groups = contact::list_groups(state.db.pool(), user.id())
        .await?
        .into_iter()
        .map(|(group, member_count)| GroupSummary { group, member_count })
        .collect();
    Ok(Json(GroupsResponse { success: true, groups }))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub success: bool,
    pub group: ContactGroup,
}

pub async fn create_group(
    State(state): State<AppState>,
    user: DashboardUser,
    ApiJson(body): ApiJson<CreateGroupBody>,
) -> Result<Json<GroupResponse>> {
    let name = body.name.trim();
    validate_label("name", name)?;
    let group = contact::create_group(state.db.pool(), user.id(), name).await?;
    Ok(Json(GroupResponse { success: true, group }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersBody {
    pub contact_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub success: bool,
    pub added: u64,
}

pub async fn add_members(
    State(state): State<AppState>,
    user: DashboardUser,
    Path(group_id): Path<i64>,
    ApiJson(body): ApiJson<MembersBody>,
) -> Result<Json<MembersResponse>> {
    if body.contact_ids.is_empty() {
        return Err(ApiError::BadRequest("contactIds must not be empty".to_string()));
    }
    let added = contact::add_members(state.db.pool(), user.id(), group_id, &body.contact_ids).await?;
    Ok(Json(MembersResponse { success: true, added }))
}
