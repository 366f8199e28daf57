use actix_web::{web, HttpResponse};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::store::{IdeaStore, NewComment};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::post().to(create)));
}

#[derive(Deserialize, Clone)]
struct CreateCommentRequest {
    idea_id: Option<i64>,
    writer: Option<String>,
    content: Option<String>,
    parent_comment_id: Option<i64>,
}

#[derive(Serialize)]
struct CommentIdData {
    comment_id: i64,
}

async fn create(
    store: web::Data<dyn IdeaStore>,
    ctx: RequestContext,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let draft = validate_comment_input(payload.into_inner())?;
    debug!(
        "comment create idea_id={} from {}",
        draft.idea_id,
        ctx.client()
    );
    let comment_id = store.create_comment(draft).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CommentIdData { comment_id })))
}

fn validate_comment_input(input: CreateCommentRequest) -> Result<NewComment, AppError> {
    let idea_id = input.idea_id.unwrap_or(0);
    if idea_id <= 0 {
        return Err(AppError::validation("a valid idea_id is required"));
    }

    let writer = input.writer.unwrap_or_default().trim().to_string();
    if writer.is_empty() {
        return Err(AppError::validation("writer is required"));
    }
    if writer.chars().count() > 50 {
        return Err(AppError::validation("writer must be 50 characters or fewer"));
    }

    let content = input.content.unwrap_or_default().trim().to_string();
    if content.is_empty() {
        return Err(AppError::validation("content is required"));
    }
    if content.chars().count() > 1000 {
        return Err(AppError::validation(
            "content must be 1000 characters or fewer",
        ));
    }

    if let Some(parent_id) = input.parent_comment_id {
        if parent_id <= 0 {
            return Err(AppError::validation("parent_comment_id must be positive"));
        }
    }

    Ok(NewComment {
        idea_id,
        writer,
        content,
        parent_comment_id: input.parent_comment_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(idea_id: i64, writer: &str, content: &str) -> CreateCommentRequest {
        CreateCommentRequest {
            idea_id: Some(idea_id),
            writer: Some(writer.to_string()),
            content: Some(content.to_string()),
            parent_comment_id: None,
        }
    }

    #[test]
    fn accepts_a_plain_comment() {
        let draft = validate_comment_input(request(7, "hana", "well said")).unwrap();
        assert_eq!(draft.idea_id, 7);
        assert_eq!(draft.parent_comment_id, None);
    }

    #[test]
    fn rejects_missing_or_nonpositive_idea_id() {
        assert!(validate_comment_input(request(0, "hana", "x")).is_err());
        let mut req = request(7, "hana", "x");
        req.idea_id = None;
        assert!(validate_comment_input(req).is_err());
    }

    #[test]
    fn rejects_oversized_content() {
        assert!(validate_comment_input(request(7, "hana", &"y".repeat(1001))).is_err());
        assert!(validate_comment_input(request(7, &"w".repeat(51), "fine")).is_err());
    }

    #[test]
    fn parent_comment_id_must_be_positive_when_present() {
        let mut req = request(7, "hana", "reply");
        req.parent_comment_id = Some(-2);
        assert!(validate_comment_input(req.clone()).is_err());
        req.parent_comment_id = Some(3);
        assert_eq!(
            validate_comment_input(req).unwrap().parent_comment_id,
            Some(3)
        );
    }
}
