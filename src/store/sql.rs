//! Relational backend. Filtering, sorting and pagination are pushed into
//! SQL built from the shared mirrors in `crate::query`; tag lists are
//! stitched in afterwards from a single join query per page.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, Set, Statement, TransactionError,
    TransactionTrait,
};

use crate::entity::{comment, idea, idea_tag, tag};
use crate::error::AppError;
use crate::query::{ListQuery, TagQuery};
use crate::store::{
    CommentRecord, IdeaChanges, IdeaPage, IdeaRecord, IdeaStore, NewComment, NewIdea, RelatedIdea,
    TagRecord,
};

pub struct SqlIdeaStore {
    db: DatabaseConnection,
}

impl SqlIdeaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdeaStore for SqlIdeaStore {
    async fn list_ideas(&self, query: &ListQuery) -> Result<IdeaPage, AppError> {
        let mut where_sql = vec!["i.status = 'active'".to_string()];
        let mut values: Vec<sea_orm::Value> = Vec::new();
        query.filters.push_sql(&mut where_sql, &mut values);
        let where_clause = where_sql.join(" and ");

        // Count and page slice are two round trips with no shared snapshot;
        // a write landing in between can make them disagree.
        let count_sql = format!("select count(*) as cnt from ideas i where {}", where_clause);
        let total_count = query_count(&self.db, &count_sql, values.clone()).await?;

        let list_sql = format!(
            "select i.id, i.title, i.content, i.writer, i.created_at, i.updated_at, \
             i.view_count, i.fork_count, i.comment_count \
             from ideas i where {} order by {} limit ? offset ?",
            where_clause,
            query.order_by()
        );
        values.push(query.limit.into());
        values.push(query.offset().into());
        let rows = query_all(&self.db, &list_sql, values).await?;
        let mut ideas: Vec<IdeaRecord> = rows.iter().map(row_to_idea).collect();
        attach_tags(&self.db, &mut ideas).await?;
        Ok(IdeaPage { ideas, total_count })
    }

    async fn get_idea(&self, id: i64) -> Result<Option<IdeaRecord>, AppError> {
        let row = query_one(
            &self.db,
            "select i.id, i.title, i.content, i.writer, i.created_at, i.updated_at, \
             i.view_count, i.fork_count, i.comment_count \
             from ideas i where i.id = ? and i.status = 'active'",
            vec![id.into()],
        )
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut ideas = vec![row_to_idea(&row)];
        attach_tags(&self.db, &mut ideas).await?;
        Ok(ideas.pop())
    }

    async fn increment_view_count(&self, id: i64) -> Result<(), AppError> {
        exec_sql(
            &self.db,
            "update ideas set view_count = view_count + 1 where id = ?",
            vec![id.into()],
        )
        .await
    }

    async fn create_idea(&self, draft: NewIdea) -> Result<i64, AppError> {
        let idea_id = self
            .db
            .transaction::<_, i64, AppError>(|txn| {
                let draft = draft.clone();
                Box::pin(async move {
                    let model = idea::ActiveModel {
                        title: Set(draft.title),
                        content: Set(draft.content),
                        writer: Set(draft.writer),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                        view_count: Set(0),
                        fork_count: Set(0),
                        comment_count: Set(0),
                        status: Set("active".to_string()),
                        ..Default::default()
                    };
                    let inserted = model.insert(txn).await.map_err(AppError::store)?;
                    link_tags(txn, inserted.id, &draft.tags).await?;
                    Ok(inserted.id)
                })
            })
            .await
            .map_err(map_tx_error)?;
        debug!("idea created id={}", idea_id);
        Ok(idea_id)
    }

    async fn update_idea(&self, id: i64, changes: IdeaChanges) -> Result<(), AppError> {
        self.db
            .transaction::<_, (), AppError>(|txn| {
                let changes = changes.clone();
                Box::pin(async move {
                    exec_sql(
                        txn,
                        "update ideas set title = ?, content = ?, updated_at = ? \
                         where id = ? and status = 'active'",
                        vec![
                            changes.title.into(),
                            changes.content.into(),
                            Utc::now().into(),
                            id.into(),
                        ],
                    )
                    .await?;
                    unlink_tags(txn, id).await?;
                    link_tags(txn, id, &changes.tags).await?;
                    Ok(())
                })
            })
            .await
            .map_err(map_tx_error)?;
        debug!("idea updated id={}", id);
        Ok(())
    }

    async fn soft_delete_idea(&self, id: i64) -> Result<(), AppError> {
        self.db
            .transaction::<_, (), AppError>(|txn| {
                Box::pin(async move {
                    exec_sql(
                        txn,
                        "update ideas set status = 'deleted', updated_at = ? \
                         where id = ? and status = 'active'",
                        vec![Utc::now().into(), id.into()],
                    )
                    .await?;
                    exec_sql(
                        txn,
                        "update comments set status = 'deleted', updated_at = ? \
                         where idea_id = ? and status = 'active'",
                        vec![Utc::now().into(), id.into()],
                    )
                    .await?;
                    unlink_tags(txn, id).await?;
                    Ok(())
                })
            })
            .await
            .map_err(map_tx_error)?;
        debug!("idea deleted id={}", id);
        Ok(())
    }

    async fn list_tags(&self, query: &TagQuery) -> Result<Vec<TagRecord>, AppError> {
        let mut where_sql = vec!["1 = 1".to_string()];
        let mut values: Vec<sea_orm::Value> = Vec::new();
        if !query.search.is_empty() {
            where_sql.push("name like ?".to_string());
            values.push(format!("%{}%", query.search).into());
        }
        let sql = format!(
            "select id, name, usage_count, created_at from tags \
             where {} order by {} desc, name asc limit ?",
            where_sql.join(" and "),
            query.sort.as_str()
        );
        values.push(query.limit.into());
        let rows = query_all(&self.db, &sql, values).await?;
        Ok(rows
            .iter()
            .map(|row| TagRecord {
                id: row.try_get("", "id").unwrap_or(0),
                name: row.try_get("", "name").unwrap_or_default(),
                usage_count: row.try_get("", "usage_count").unwrap_or(0),
                created_at: get_datetime(row, "created_at").unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect())
    }

    async fn create_comment(&self, draft: NewComment) -> Result<i64, AppError> {
        let comment_id = self
            .db
            .transaction::<_, i64, AppError>(|txn| {
                let draft = draft.clone();
                Box::pin(async move {
                    let exists = query_count(
                        txn,
                        "select count(*) as cnt from ideas where id = ? and status = 'active'",
                        vec![draft.idea_id.into()],
                    )
                    .await?;
                    if exists == 0 {
                        return Err(AppError::not_found("idea not found"));
                    }

                    let model = comment::ActiveModel {
                        idea_id: Set(draft.idea_id),
                        writer: Set(draft.writer),
                        content: Set(draft.content),
                        parent_comment_id: Set(draft.parent_comment_id),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                        status: Set("active".to_string()),
                        ..Default::default()
                    };
                    let inserted = model.insert(txn).await.map_err(AppError::store)?;
                    exec_sql(
                        txn,
                        "update ideas set comment_count = comment_count + 1 where id = ?",
                        vec![draft.idea_id.into()],
                    )
                    .await?;
                    Ok(inserted.id)
                })
            })
            .await
            .map_err(map_tx_error)?;
        debug!("comment created id={}", comment_id);
        Ok(comment_id)
    }

    async fn comments_for_idea(&self, idea_id: i64) -> Result<Vec<CommentRecord>, AppError> {
        let rows = query_all(
            &self.db,
            "select id, writer, content, created_at \
             from comments where idea_id = ? and status = 'active' \
             order by created_at asc limit 50",
            vec![idea_id.into()],
        )
        .await?;
        Ok(rows
            .iter()
            .map(|row| CommentRecord {
                id: row.try_get("", "id").unwrap_or(0),
                writer: row.try_get("", "writer").unwrap_or_default(),
                content: row.try_get("", "content").unwrap_or_default(),
                created_at: get_datetime(row, "created_at").unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect())
    }

    async fn related_ideas(&self, idea_id: i64) -> Result<Vec<RelatedIdea>, AppError> {
        let rows = query_all(
            &self.db,
            "select distinct i.id, i.title, i.writer, i.created_at, \
             i.view_count, i.fork_count, i.comment_count \
             from ideas i \
             join idea_tags it1 on i.id = it1.idea_id \
             join idea_tags it2 on it1.tag_id = it2.tag_id \
             where it2.idea_id = ? and i.id != ? and i.status = 'active' \
             order by i.view_count desc, i.created_at desc limit 5",
            vec![idea_id.into(), idea_id.into()],
        )
        .await?;
        Ok(rows
            .iter()
            .map(|row| RelatedIdea {
                id: row.try_get("", "id").unwrap_or(0),
                title: row.try_get("", "title").unwrap_or_default(),
                writer: row.try_get("", "writer").unwrap_or_default(),
                created_at: get_datetime(row, "created_at").unwrap_or(DateTime::UNIX_EPOCH),
                view_count: row.try_get("", "view_count").unwrap_or(0),
                fork_count: row.try_get("", "fork_count").unwrap_or(0),
                comment_count: row.try_get("", "comment_count").unwrap_or(0),
            })
            .collect())
    }
}

/// Fills `tags` on each record from one join query, ordered by usage_count
/// descending (name breaks ties so ordering stays deterministic).
async fn attach_tags<C: ConnectionTrait>(
    db: &C,
    ideas: &mut [IdeaRecord],
) -> Result<(), AppError> {
    if ideas.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; ideas.len()].join(",");
    let sql = format!(
        "select it.idea_id, t.name from idea_tags it \
         join tags t on t.id = it.tag_id \
         where it.idea_id in ({}) \
         order by t.usage_count desc, t.name asc",
        placeholders
    );
    let values: Vec<sea_orm::Value> = ideas.iter().map(|i| i.id.into()).collect();
    let rows = query_all(db, &sql, values).await?;

    let mut by_idea: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        let idea_id: i64 = row.try_get("", "idea_id").unwrap_or(0);
        if let Ok(name) = row.try_get::<String>("", "name") {
            by_idea.entry(idea_id).or_default().push(name);
        }
    }
    for idea in ideas.iter_mut() {
        idea.tags = by_idea.remove(&idea.id).unwrap_or_default();
    }
    Ok(())
}

async fn link_tags<C: ConnectionTrait>(
    db: &C,
    idea_id: i64,
    tags: &[String],
) -> Result<(), AppError> {
    for name in tags {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let tag_id = get_or_create_tag(db, name).await?;
        let already = query_count(
            db,
            "select count(*) as cnt from idea_tags where idea_id = ? and tag_id = ?",
            vec![idea_id.into(), tag_id.into()],
        )
        .await?;
        if already > 0 {
            continue;
        }
        let link = idea_tag::ActiveModel {
            idea_id: Set(idea_id),
            tag_id: Set(tag_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        link.insert(db).await.map_err(AppError::store)?;
        exec_sql(
            db,
            "update tags set usage_count = usage_count + 1 where id = ?",
            vec![tag_id.into()],
        )
        .await?;
    }
    Ok(())
}

async fn unlink_tags<C: ConnectionTrait>(db: &C, idea_id: i64) -> Result<(), AppError> {
    let rows = query_all(
        db,
        "select tag_id from idea_tags where idea_id = ?",
        vec![idea_id.into()],
    )
    .await?;
    for row in rows {
        let tag_id: i64 = row.try_get("", "tag_id").unwrap_or(0);
        exec_sql(
            db,
            "update tags set usage_count = usage_count - 1 where id = ? and usage_count >= 1",
            vec![tag_id.into()],
        )
        .await?;
    }
    exec_sql(
        db,
        "delete from idea_tags where idea_id = ?",
        vec![idea_id.into()],
    )
    .await
}

async fn get_or_create_tag<C: ConnectionTrait>(db: &C, name: &str) -> Result<i64, AppError> {
    let row = query_one(
        db,
        "select id from tags where name = ?",
        vec![name.into()],
    )
    .await?;
    if let Some(row) = row {
        return Ok(row.try_get("", "id").unwrap_or(0));
    }
    let model = tag::ActiveModel {
        name: Set(name.to_string()),
        usage_count: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let inserted = model.insert(db).await.map_err(AppError::store)?;
    Ok(inserted.id)
}

fn row_to_idea(row: &sea_orm::QueryResult) -> IdeaRecord {
    IdeaRecord {
        id: row.try_get("", "id").unwrap_or(0),
        title: row.try_get("", "title").unwrap_or_default(),
        content: row.try_get("", "content").unwrap_or_default(),
        writer: row.try_get("", "writer").unwrap_or_default(),
        created_at: get_datetime(row, "created_at").unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: get_datetime(row, "updated_at"),
        view_count: row.try_get("", "view_count").unwrap_or(0),
        fork_count: row.try_get("", "fork_count").unwrap_or(0),
        comment_count: row.try_get("", "comment_count").unwrap_or(0),
        tags: Vec::new(),
    }
}

async fn exec_sql<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<(), AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    db.execute(stmt).await.map_err(AppError::store)?;
    Ok(())
}

async fn query_one<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<Option<sea_orm::QueryResult>, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    db.query_one(stmt).await.map_err(AppError::store)
}

async fn query_all<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<Vec<sea_orm::QueryResult>, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    db.query_all(stmt).await.map_err(AppError::store)
}

async fn query_count<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<i64, AppError> {
    let row = query_one(db, sql, values).await?;
    Ok(row.and_then(|r| r.try_get("", "cnt").ok()).unwrap_or(0))
}

fn map_tx_error(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(db_err) => AppError::store(db_err),
        TransactionError::Transaction(app) => app,
    }
}

fn get_datetime(row: &sea_orm::QueryResult, col: &str) -> Option<DateTime<Utc>> {
    row.try_get::<DateTime<Utc>>("", col)
        .ok()
        .or_else(|| {
            row.try_get::<NaiveDateTime>("", col)
                .ok()
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        })
        .or_else(|| {
            row.try_get::<String>("", col)
                .ok()
                .and_then(|s| parse_db_datetime(&s))
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        })
}

fn parse_db_datetime(input: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}
