//! Storage abstraction over ideas, tags and comments.
//!
//! Two interchangeable implementations: a relational backend that pushes
//! filtering/sorting/pagination into SQL, and a flat-file JSON backend that
//! loads whole collections and runs the shared in-memory pipeline. For the
//! same logical query both must return the same idea ids in the same order.

pub mod file;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::query::{ListQuery, TagQuery};

/// An active idea as the rest of the crate sees it. Soft-deleted records
/// never leave the store. `tags` is ordered by tag usage_count descending,
/// the convention of the list/detail responses.
#[derive(Clone, Debug, PartialEq)]
pub struct IdeaRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub writer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub fork_count: i64,
    pub comment_count: i64,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Comment as rendered in the detail response; threading metadata stays in
/// the store.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentRecord {
    pub id: i64,
    pub writer: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Compact card used by the related-ideas block of the detail response.
#[derive(Clone, Debug, PartialEq)]
pub struct RelatedIdea {
    pub id: i64,
    pub title: String,
    pub writer: String,
    pub created_at: DateTime<Utc>,
    pub view_count: i64,
    pub fork_count: i64,
    pub comment_count: i64,
}

#[derive(Clone, Debug)]
pub struct NewIdea {
    pub title: String,
    pub content: String,
    pub writer: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct IdeaChanges {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct NewComment {
    pub idea_id: i64,
    pub writer: String,
    pub content: String,
    pub parent_comment_id: Option<i64>,
}

/// One page of listing results plus the filtered total the pagination meta
/// is computed from. With the relational backend the two come from separate
/// reads, so they can disagree when writes interleave.
#[derive(Clone, Debug)]
pub struct IdeaPage {
    pub ideas: Vec<IdeaRecord>,
    pub total_count: i64,
}

#[async_trait]
pub trait IdeaStore: Send + Sync {
    async fn list_ideas(&self, query: &ListQuery) -> Result<IdeaPage, AppError>;

    /// Active record by id; soft-deleted and unknown ids are both `None`.
    async fn get_idea(&self, id: i64) -> Result<Option<IdeaRecord>, AppError>;

    /// Unlocked read-modify-write; concurrent fetches can under-count.
    async fn increment_view_count(&self, id: i64) -> Result<(), AppError>;

    async fn create_idea(&self, draft: NewIdea) -> Result<i64, AppError>;

    async fn update_idea(&self, id: i64, changes: IdeaChanges) -> Result<(), AppError>;

    /// Marks the idea deleted, cascades to its active comments, unlinks its
    /// tags and decrements their usage counts (floored at zero).
    async fn soft_delete_idea(&self, id: i64) -> Result<(), AppError>;

    async fn list_tags(&self, query: &TagQuery) -> Result<Vec<TagRecord>, AppError>;

    /// Inserts the comment and bumps the idea's comment_count in the same
    /// write; fails with NotFound when the idea is absent or deleted.
    async fn create_comment(&self, draft: NewComment) -> Result<i64, AppError>;

    /// Active comments in `created_at ASC` order, capped at 50.
    async fn comments_for_idea(&self, idea_id: i64) -> Result<Vec<CommentRecord>, AppError>;

    /// Up to five active ideas sharing at least one tag, busiest first.
    async fn related_ideas(&self, idea_id: i64) -> Result<Vec<RelatedIdea>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::file::FileIdeaStore;
    use super::sql::SqlIdeaStore;
    use super::*;
    use crate::db;
    use crate::query::{PageLimits, RawListQuery};
    use sea_orm::{ConnectOptions, Database};
    use tempfile::TempDir;

    async fn sql_store() -> SqlIdeaStore {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1);
        let conn = Database::connect(options).await.unwrap();
        db::init_schema(&conn).await;
        SqlIdeaStore::new(conn)
    }

    fn draft(title: &str, content: &str, writer: &str, tags: &[&str]) -> NewIdea {
        NewIdea {
            title: title.to_string(),
            content: content.to_string(),
            writer: writer.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    async fn seed(store: &dyn IdeaStore) -> Vec<i64> {
        let drafts = vec![
            draft("Alpha idea", "first body", "hana", &["web", "rust"]),
            draft("Beta idea", "second body about rust", "duri", &["rust"]),
            draft("Gamma idea", "third body", "seth", &["web"]),
            draft("Delta idea", "fourth body", "hana", &[]),
            draft("Epsilon idea", "fifth body", "nova", &["cli"]),
        ];
        let mut ids = Vec::new();
        for (n, d) in drafts.into_iter().enumerate() {
            let id = store.create_idea(d).await.unwrap();
            for _ in 0..n {
                store.increment_view_count(id).await.unwrap();
            }
            ids.push(id);
        }
        ids
    }

    fn listing(raw: RawListQuery) -> ListQuery {
        ListQuery::from_raw(raw, &PageLimits { default: 10, max: 50 })
    }

    fn positions(page: &IdeaPage, ids: &[i64]) -> Vec<usize> {
        page.ideas
            .iter()
            .map(|idea| ids.iter().position(|id| *id == idea.id).unwrap())
            .collect()
    }

    #[actix_rt::test]
    async fn backends_agree_on_every_query_shape() {
        let sql = sql_store().await;
        let dir = TempDir::new().unwrap();
        let file = FileIdeaStore::new(dir.path());
        let sql_ids = seed(&sql).await;
        let file_ids = seed(&file).await;

        let queries = vec![
            RawListQuery::default(),
            RawListQuery {
                sort: Some("title".to_string()),
                order: Some("ASC".to_string()),
                ..Default::default()
            },
            RawListQuery {
                sort: Some("view_count".to_string()),
                order: Some("ASC".to_string()),
                ..Default::default()
            },
            RawListQuery {
                search: Some("rust".to_string()),
                ..Default::default()
            },
            RawListQuery {
                tag: Some("web".to_string()),
                sort: Some("title".to_string()),
                ..Default::default()
            },
            RawListQuery {
                writer: Some("hana".to_string()),
                sort: Some("title".to_string()),
                order: Some("asc".to_string()),
                ..Default::default()
            },
            RawListQuery {
                page: Some("2".to_string()),
                limit: Some("2".to_string()),
                sort: Some("title".to_string()),
                order: Some("ASC".to_string()),
                ..Default::default()
            },
            RawListQuery {
                page: Some("9".to_string()),
                ..Default::default()
            },
        ];

        for raw in queries {
            let query = listing(raw);
            let sql_page = sql.list_ideas(&query).await.unwrap();
            let file_page = file.list_ideas(&query).await.unwrap();
            assert_eq!(
                positions(&sql_page, &sql_ids),
                positions(&file_page, &file_ids),
                "order diverged for {:?}",
                query
            );
            assert_eq!(sql_page.total_count, file_page.total_count);
        }
    }

    #[actix_rt::test]
    async fn backends_agree_on_tag_ordering_within_an_idea() {
        let sql = sql_store().await;
        let dir = TempDir::new().unwrap();
        let file = FileIdeaStore::new(dir.path());

        for store in [&sql as &dyn IdeaStore, &file as &dyn IdeaStore] {
            // "web" ends up used twice, "rust" once.
            store
                .create_idea(draft("First", "body", "hana", &["rust", "web"]))
                .await
                .unwrap();
            store
                .create_idea(draft("Second", "body", "duri", &["web"]))
                .await
                .unwrap();
        }

        let query = listing(RawListQuery {
            search: Some("First".to_string()),
            ..Default::default()
        });
        let sql_tags = sql.list_ideas(&query).await.unwrap().ideas[0].tags.clone();
        let file_tags = file.list_ideas(&query).await.unwrap().ideas[0].tags.clone();
        assert_eq!(sql_tags, vec!["web".to_string(), "rust".to_string()]);
        assert_eq!(sql_tags, file_tags);
    }
}
