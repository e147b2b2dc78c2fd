//! Generic CRUD handlers shared by every resource.
//!
//! Each resource handler opens a connection, builds its repository and hands it to one of these
//! functions. Validation, not-found handling, pagination bounds, projection and the success
//! envelope live here once.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    api::models::validation::{Validate, ValidatePatch},
    db::handlers::{ListFilter, Repository},
    errors::{Error, Result},
};

/// A single entity in the success envelope: `{status, data: {data}}`.
#[derive(Debug)]
pub struct Document<T> {
    pub status: StatusCode,
    pub data: T,
}

impl<T> Document<T> {
    pub fn ok(data: T) -> Self {
        Self { status: StatusCode::OK, data }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Document<T> {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "status": "success", "data": { "data": self.data } }))).into_response()
    }
}

/// A page of projected entities: `{status, results, data: {data}}`.
#[derive(Debug)]
pub struct DocumentList {
    pub data: Vec<Value>,
}

impl DocumentList {
    /// Serialize and project each entity.
    pub fn project<T: Serialize>(items: Vec<T>, filter: &ListFilter) -> Result<Self> {
        let data = items
            .into_iter()
            .map(|item| serde_json::to_value(item).map(|value| filter.projection.apply(value)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Internal {
                operation: format!("serialize list item: {e}"),
            })?;
        Ok(Self { data })
    }
}

impl IntoResponse for DocumentList {
    fn into_response(self) -> Response {
        Json(json!({
            "status": "success",
            "results": self.data.len(),
            "data": { "data": self.data },
        }))
        .into_response()
    }
}

/// Validate a payload and create the entity.
pub async fn create_one<R, P, A>(repo: &mut R, payload: P) -> Result<Document<A>>
where
    R: Repository + Send,
    P: Validate<Valid = R::CreateRequest>,
    A: From<R::Response> + Serialize,
{
    let request = payload.validate().map_err(|errors| Error::Validation { errors })?;
    let created = repo.create(&request).await?;
    Ok(Document::created(A::from(created)))
}

/// Fetch one entity or fail with a 404.
pub async fn get_one<R, A>(repo: &mut R, id: R::Id, resource: &str) -> Result<Document<A>>
where
    R: Repository + Send,
    A: From<R::Response> + Serialize,
{
    let found = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found(resource, id))?;
    Ok(Document::ok(A::from(found)))
}

/// List a page of entities. A page past the last match is a 404.
pub async fn get_all<R, A>(repo: &mut R, filter: &ListFilter) -> Result<DocumentList>
where
    R: Repository<Filter = ListFilter> + Send,
    A: From<R::Response> + Serialize,
{
    if filter.page > 1 {
        let total = repo.count(filter).await?;
        if filter.skip() >= total {
            return Err(Error::page_not_found(filter.page));
        }
    }
    let items = repo.list(filter).await?;
    DocumentList::project(items.into_iter().map(A::from).collect(), filter)
}

/// Merge a partial update into the current entity, validate the result, and store it.
pub async fn update_one<R, P, A>(repo: &mut R, id: R::Id, payload: P, resource: &str) -> Result<Document<A>>
where
    R: Repository + Send,
    P: ValidatePatch<R::Response, Valid = R::UpdateRequest>,
    A: From<R::Response> + Serialize,
{
    let current = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found(resource, id))?;
    let request = payload.validate_patch(&current).map_err(|errors| Error::Validation { errors })?;
    let updated = repo.update(id, &request).await?;
    Ok(Document::ok(A::from(updated)))
}

/// Delete an entity: 204 when it existed, 404 otherwise.
pub async fn delete_one<R>(repo: &mut R, id: R::Id, resource: &str) -> Result<StatusCode>
where
    R: Repository + Send,
{
    if repo.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found(resource, id))
    }
}
