//! Kitsu API request and response bodies
//!
//! Records shared with the sync engine live in `bridge_traits::entity`;
//! this module only holds the wire shapes the connector builds or unwraps.

use bridge_traits::entity::Person;
use bridge_traits::metadata::EntityData;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST auth/login`
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: Person,
    pub access_token: String,
}

/// `GET auth/authenticated`
#[derive(Debug, Deserialize)]
pub struct AuthenticatedResponse {
    #[serde(default)]
    pub authenticated: bool,
    pub user: Person,
}

#[derive(Debug, Serialize)]
pub struct NameBody<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewSequenceBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct NewShotBody<'a> {
    pub name: &'a str,
    pub sequence_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_frames: Option<i64>,
    pub data: &'a EntityData,
}

/// `PUT data/entities/<id>` for shots
#[derive(Debug, Serialize)]
pub struct ShotUpdateBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_frames: Option<i64>,
    pub data: &'a EntityData,
}

#[derive(Debug, Serialize)]
pub struct NewAssetBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub data: &'a EntityData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<&'a str>,
}

/// `PUT data/entities/<id>` for assets
#[derive(Debug, Serialize)]
pub struct AssetUpdateBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub data: &'a EntityData,
}

#[derive(Debug, Serialize)]
pub struct NewTaskBody<'a> {
    pub project_id: &'a str,
    pub task_type_id: &'a str,
    pub entity_id: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CommentBody<'a> {
    pub task_status_id: &'a str,
    pub comment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<&'a str>,
}
