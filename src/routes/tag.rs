use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::format::format_timestamp;
use crate::query::{RawTagQuery, TagQuery};
use crate::response::ApiResponse;
use crate::store::IdeaStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::get().to(list)));
}

#[derive(Serialize)]
struct TagDto {
    id: i64,
    name: String,
    usage_count: i64,
    created_at: String,
}

#[derive(Serialize)]
struct TagListData {
    tags: Vec<TagDto>,
    total: i64,
    search: String,
    sort: &'static str,
}

async fn list(
    store: web::Data<dyn IdeaStore>,
    params: web::Query<RawTagQuery>,
) -> Result<HttpResponse, AppError> {
    let query = TagQuery::from_raw(params.into_inner());
    let tags = store.list_tags(&query).await?;

    let dtos: Vec<TagDto> = tags
        .into_iter()
        .map(|t| TagDto {
            id: t.id,
            name: t.name,
            usage_count: t.usage_count,
            created_at: format_timestamp(t.created_at),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(TagListData {
        total: dtos.len() as i64,
        tags: dtos,
        search: query.search,
        sort: query.sort.as_str(),
    })))
}
