//! Conductor API types
//!
//! Request DTOs of the backend, parsed from raw query-string maps into
//! validated, typed structures.

pub mod dto;
pub mod error;

pub use dto::pagination::Pagination;
pub use dto::users_list_filter::{
    parse_users_list_filter_dto, UserExpand, UserFilter, UserSelectField, UsersListFilterDto,
    UsersListSortBy,
};
pub use error::{Result, ValidationError};
