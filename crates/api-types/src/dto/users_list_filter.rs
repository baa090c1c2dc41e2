//! Query DTO for the users list endpoint

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_json_param;
use super::pagination::Pagination;
use crate::error::{Result, ValidationError};

/// Sort orders accepted by the users list.
///
/// `role:asc` orders Owner, Admin, Member. Without an explicit order the
/// backend sorts by `role:asc` and then `name:asc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsersListSortBy {
    #[serde(rename = "name:asc")]
    NameAsc,
    #[serde(rename = "name:desc")]
    NameDesc,
    #[serde(rename = "role:asc")]
    RoleAsc,
    #[serde(rename = "role:desc")]
    RoleDesc,
    #[serde(rename = "lastActive:asc")]
    LastActiveAsc,
    #[serde(rename = "lastActive:desc")]
    LastActiveDesc,
}

impl UsersListSortBy {
    pub const ALL: [UsersListSortBy; 6] = [
        UsersListSortBy::NameAsc,
        UsersListSortBy::NameDesc,
        UsersListSortBy::RoleAsc,
        UsersListSortBy::RoleDesc,
        UsersListSortBy::LastActiveAsc,
        UsersListSortBy::LastActiveDesc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsersListSortBy::NameAsc => "name:asc",
            UsersListSortBy::NameDesc => "name:desc",
            UsersListSortBy::RoleAsc => "role:asc",
            UsersListSortBy::RoleDesc => "role:desc",
            UsersListSortBy::LastActiveAsc => "lastActive:asc",
            UsersListSortBy::LastActiveDesc => "lastActive:desc",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == token)
    }
}

impl fmt::Display for UsersListSortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User fields that may be requested through `select`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserSelectField {
    Id,
    FirstName,
    LastName,
    Email,
    Disabled,
    MfaEnabled,
    Role,
}

impl UserSelectField {
    pub const ALL: [UserSelectField; 7] = [
        UserSelectField::Id,
        UserSelectField::FirstName,
        UserSelectField::LastName,
        UserSelectField::Email,
        UserSelectField::Disabled,
        UserSelectField::MfaEnabled,
        UserSelectField::Role,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserSelectField::Id => "id",
            UserSelectField::FirstName => "firstName",
            UserSelectField::LastName => "lastName",
            UserSelectField::Email => "email",
            UserSelectField::Disabled => "disabled",
            UserSelectField::MfaEnabled => "mfaEnabled",
            UserSelectField::Role => "role",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == token)
    }
}

/// Optional filters on the users list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Relations to expand on each user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExpand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_relations: Option<bool>,
}

/// Validated users list query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersListFilterDto {
    #[serde(flatten)]
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<UserSelectField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<UserFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<UserExpand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<UsersListSortBy>,
}

/// Parse the raw query map of a users list request.
///
/// `select`, `filter`, `expand` and `sortBy` arrive JSON-encoded. Empty or
/// missing values are treated as absent.
pub fn parse_users_list_filter_dto(query: &HashMap<String, String>) -> Result<UsersListFilterDto> {
    let raw = |key: &str| query.get(key).map(String::as_str).filter(|v| !v.is_empty());

    let pagination = Pagination::parse(raw("skip"), raw("take"))?;

    let select = raw("select")
        .map(|v| parse_json_param("select", v).and_then(|json| parse_select(&json)))
        .transpose()?;
    let filter = raw("filter")
        .map(|v| parse_json_param("filter", v).and_then(parse_filter))
        .transpose()?;
    let expand = raw("expand")
        .map(|v| parse_json_param("expand", v).and_then(parse_expand))
        .transpose()?;
    let sort_by = raw("sortBy")
        .map(|v| parse_json_param("sortBy", v).and_then(|json| parse_sort_by(&json)))
        .transpose()?;

    Ok(UsersListFilterDto {
        pagination,
        select,
        filter,
        expand,
        sort_by,
    })
}

fn accepted<T, const N: usize>(all: [T; N], name: impl Fn(&T) -> &'static str) -> Vec<String> {
    all.iter().map(|item| name(item).to_string()).collect()
}

fn parse_select(json: &Value) -> Result<Vec<UserSelectField>> {
    let items = json.as_array().ok_or_else(|| ValidationError::WrongType {
        param: "select".to_string(),
        expected: "an array of field names".to_string(),
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(UserSelectField::from_token)
                .ok_or_else(|| ValidationError::NotOneOf {
                    param: "select".to_string(),
                    value: item.to_string(),
                    accepted: accepted(UserSelectField::ALL, UserSelectField::as_str),
                })
        })
        .collect()
}

fn parse_filter(json: Value) -> Result<UserFilter> {
    if !json.is_object() {
        return Err(filter_type_error());
    }
    serde_json::from_value(json).map_err(|_| filter_type_error())
}

fn filter_type_error() -> ValidationError {
    ValidationError::WrongType {
        param: "filter".to_string(),
        expected: "an object with optional isOwner (boolean), firstName, lastName and email (string)"
            .to_string(),
    }
}

fn parse_expand(json: Value) -> Result<UserExpand> {
    let type_error = || ValidationError::WrongType {
        param: "expand".to_string(),
        expected: "an object with optional projectRelations (boolean)".to_string(),
    };
    if !json.is_object() {
        return Err(type_error());
    }
    serde_json::from_value(json).map_err(|_| type_error())
}

fn parse_sort_by(json: &Value) -> Result<UsersListSortBy> {
    json.as_str()
        .and_then(UsersListSortBy::from_token)
        .ok_or_else(|| ValidationError::NotOneOf {
            param: "sortBy".to_string(),
            value: json.to_string(),
            accepted: accepted(UsersListSortBy::ALL, UsersListSortBy::as_str),
        })
}
