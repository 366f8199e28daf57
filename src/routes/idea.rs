use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::error::AppError;
use crate::format::{format_timestamp, relative_time, summarize_content};
use crate::query::{ListQuery, Pagination, RawListQuery};
use crate::response::ApiResponse;
use crate::store::{IdeaChanges, IdeaRecord, IdeaStore, NewIdea, RelatedIdea};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/{id:\\d+}")
            .route(web::get().to(detail))
            .route(web::put().to(update))
            .route(web::delete().to(remove)),
    );
}

#[derive(Serialize)]
struct IdeaSummaryDto {
    id: i64,
    title: String,
    content: String,
    writer: String,
    created_at: String,
    view_count: i64,
    fork_count: i64,
    comment_count: i64,
    tags: Vec<String>,
    relative_time: String,
}

#[derive(Serialize)]
struct FiltersDto {
    search: String,
    tag: String,
    writer: String,
    sort: &'static str,
    order: &'static str,
}

#[derive(Serialize)]
struct ListData {
    ideas: Vec<IdeaSummaryDto>,
    pagination: Pagination,
    filters: FiltersDto,
}

#[derive(Serialize)]
struct CommentDto {
    id: i64,
    writer: String,
    content: String,
    created_at: String,
    relative_time: String,
}

#[derive(Serialize)]
struct RelatedIdeaDto {
    id: i64,
    title: String,
    writer: String,
    created_at: String,
    view_count: i64,
    fork_count: i64,
    comment_count: i64,
    relative_time: String,
}

#[derive(Serialize)]
struct IdeaDetailDto {
    id: i64,
    title: String,
    content: String,
    writer: String,
    created_at: String,
    updated_at: Option<String>,
    view_count: i64,
    fork_count: i64,
    comment_count: i64,
    tags: Vec<String>,
    relative_time: String,
    comments: Vec<CommentDto>,
    related_ideas: Vec<RelatedIdeaDto>,
}

#[derive(Serialize)]
struct IdeaIdData {
    idea_id: i64,
}

#[derive(Deserialize)]
struct CreateIdeaRequest {
    title: Option<String>,
    content: Option<String>,
    writer: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct UpdateIdeaRequest {
    title: Option<String>,
    content: Option<String>,
    original_writer: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct DeleteIdeaRequest {
    original_writer: Option<String>,
}

async fn list(
    store: web::Data<dyn IdeaStore>,
    config: web::Data<AppConfig>,
    params: web::Query<RawListQuery>,
) -> Result<HttpResponse, AppError> {
    let query = ListQuery::from_raw(params.into_inner(), &config.page_limits());
    let page = store.list_ideas(&query).await?;

    let now = Utc::now();
    let ideas = page
        .ideas
        .into_iter()
        .map(|idea| summary_dto(idea, now))
        .collect();
    let pagination = Pagination::compute(page.total_count, query.page, query.limit);
    let filters = FiltersDto {
        search: query.filters.search.clone(),
        tag: query.filters.tag.clone(),
        writer: query.filters.writer.clone(),
        sort: query.sort.as_str(),
        order: query.order.as_str(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(ListData {
        ideas,
        pagination,
        filters,
    })))
}

async fn detail(
    store: web::Data<dyn IdeaStore>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let idea_id = *path;
    let idea = store
        .get_idea(idea_id)
        .await?
        .ok_or_else(|| AppError::not_found("idea not found"))?;

    // Unlocked read-then-increment; concurrent fetches can under-count.
    store.increment_view_count(idea_id).await?;

    let comments = store.comments_for_idea(idea_id).await?;
    let related = store.related_ideas(idea_id).await?;
    let now = Utc::now();

    let dto = IdeaDetailDto {
        id: idea.id,
        title: idea.title,
        content: idea.content,
        writer: idea.writer,
        created_at: format_timestamp(idea.created_at),
        updated_at: idea.updated_at.map(format_timestamp),
        view_count: idea.view_count + 1,
        fork_count: idea.fork_count,
        comment_count: idea.comment_count,
        tags: idea.tags,
        relative_time: relative_time(idea.created_at, now),
        comments: comments
            .into_iter()
            .map(|c| CommentDto {
                id: c.id,
                writer: c.writer,
                content: c.content,
                created_at: format_timestamp(c.created_at),
                relative_time: relative_time(c.created_at, now),
            })
            .collect(),
        related_ideas: related.into_iter().map(|r| related_dto(r, now)).collect(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(dto)))
}

async fn create(
    store: web::Data<dyn IdeaStore>,
    ctx: RequestContext,
    payload: web::Json<CreateIdeaRequest>,
) -> Result<HttpResponse, AppError> {
    let draft = validate_idea_input(payload.into_inner())?;
    debug!(
        "idea create from {} csrf_token={}",
        ctx.client(),
        ctx.csrf_token.is_some()
    );
    let idea_id = store.create_idea(draft).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(IdeaIdData { idea_id })))
}

async fn update(
    store: web::Data<dyn IdeaStore>,
    ctx: RequestContext,
    path: web::Path<i64>,
    payload: web::Json<UpdateIdeaRequest>,
) -> Result<HttpResponse, AppError> {
    let idea_id = *path;
    let input = payload.into_inner();
    let original_writer = required_field(input.original_writer, "original_writer")?;
    let title = validate_title(input.title)?;
    let content = validate_content(input.content)?;
    let tags = validate_tags(input.tags.unwrap_or_default())?;

    let existing = store
        .get_idea(idea_id)
        .await?
        .ok_or_else(|| AppError::not_found("idea not found"))?;
    if existing.writer != original_writer {
        return Err(AppError::forbidden(
            "only the original writer can edit this idea",
        ));
    }

    debug!("idea update id={} from {}", idea_id, ctx.client());
    store
        .update_idea(idea_id, IdeaChanges { title, content, tags })
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(IdeaIdData { idea_id })))
}

async fn remove(
    store: web::Data<dyn IdeaStore>,
    ctx: RequestContext,
    path: web::Path<i64>,
    payload: web::Json<DeleteIdeaRequest>,
) -> Result<HttpResponse, AppError> {
    let idea_id = *path;
    let original_writer = required_field(payload.into_inner().original_writer, "original_writer")?;

    let existing = store
        .get_idea(idea_id)
        .await?
        .ok_or_else(|| AppError::not_found("idea not found"))?;
    if existing.writer != original_writer {
        return Err(AppError::forbidden(
            "only the original writer can delete this idea",
        ));
    }

    debug!("idea delete id={} from {}", idea_id, ctx.client());
    store.soft_delete_idea(idea_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(IdeaIdData { idea_id })))
}

fn summary_dto(idea: IdeaRecord, now: DateTime<Utc>) -> IdeaSummaryDto {
    IdeaSummaryDto {
        id: idea.id,
        title: idea.title,
        content: summarize_content(&idea.content),
        writer: idea.writer,
        created_at: format_timestamp(idea.created_at),
        view_count: idea.view_count,
        fork_count: idea.fork_count,
        comment_count: idea.comment_count,
        tags: idea.tags,
        relative_time: relative_time(idea.created_at, now),
    }
}

fn related_dto(idea: RelatedIdea, now: DateTime<Utc>) -> RelatedIdeaDto {
    RelatedIdeaDto {
        id: idea.id,
        title: idea.title,
        writer: idea.writer,
        created_at: format_timestamp(idea.created_at),
        view_count: idea.view_count,
        fork_count: idea.fork_count,
        comment_count: idea.comment_count,
        relative_time: relative_time(idea.created_at, now),
    }
}

fn validate_idea_input(input: CreateIdeaRequest) -> Result<NewIdea, AppError> {
    let title = validate_title(input.title)?;
    let content = validate_content(input.content)?;
    let writer = required_field(input.writer, "writer")?;
    if writer.chars().count() > 50 {
        return Err(AppError::validation("writer must be 50 characters or fewer"));
    }
    let tags = validate_tags(input.tags.unwrap_or_default())?;
    Ok(NewIdea {
        title,
        content,
        writer,
        tags,
    })
}

fn validate_title(title: Option<String>) -> Result<String, AppError> {
    let title = required_field(title, "title")?;
    if title.chars().count() > 100 {
        return Err(AppError::validation("title must be 100 characters or fewer"));
    }
    Ok(title)
}

fn validate_content(content: Option<String>) -> Result<String, AppError> {
    let content = required_field(content, "content")?;
    if content.chars().count() > 5000 {
        return Err(AppError::validation(
            "content must be 5000 characters or fewer",
        ));
    }
    Ok(content)
}

fn validate_tags(tags: Vec<String>) -> Result<Vec<String>, AppError> {
    if tags.len() > 10 {
        return Err(AppError::validation("at most 10 tags are allowed"));
    }
    let mut cleaned = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > 20 {
            return Err(AppError::validation(
                "each tag must be 20 characters or fewer",
            ));
        }
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    Ok(cleaned)
}

fn required_field(value: Option<String>, name: &str) -> Result<String, AppError> {
    let value = value.unwrap_or_default().trim().to_string();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", name)));
    }
    Ok(value)
}
