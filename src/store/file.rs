//! Flat-file JSON backend: one document per entity kind under a data
//! directory. Every call re-reads the whole collection and every write
//! re-serializes it, so state never survives in memory between requests.
//!
//! There is no locking of any kind. Two concurrent writers read-modify-write
//! the same document and the slower one wins; this backend is only suitable
//! for single-writer deployments (see DESIGN.md for the trade-off note).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::AppError;
use crate::query::{self, ListQuery, TagQuery};
use crate::store::{
    CommentRecord, IdeaChanges, IdeaPage, IdeaRecord, IdeaStore, NewComment, NewIdea, RelatedIdea,
    TagRecord,
};

const IDEAS_FILE: &str = "ideas.json";
const TAGS_FILE: &str = "tags.json";
const COMMENTS_FILE: &str = "comments.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredIdea {
    id: i64,
    title: String,
    content: String,
    writer: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    view_count: i64,
    fork_count: i64,
    comment_count: i64,
    status: String,
    tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTag {
    id: i64,
    name: String,
    usage_count: i64,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredComment {
    id: i64,
    idea_id: i64,
    writer: String,
    content: String,
    parent_comment_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    status: String,
}

pub struct FileIdeaStore {
    dir: PathBuf,
}

impl FileIdeaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, AppError> {
        let path = self.dir.join(file);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(AppError::store),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(AppError::store(err)),
        }
    }

    async fn save<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).await.map_err(AppError::store)?;
        let bytes = serde_json::to_vec_pretty(items).map_err(AppError::store)?;
        fs::write(self.dir.join(file), bytes)
            .await
            .map_err(AppError::store)
    }

    async fn active_records(&self) -> Result<Vec<IdeaRecord>, AppError> {
        let ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        let tags = self.load::<StoredTag>(TAGS_FILE).await?;
        let usage = usage_by_name(&tags);
        Ok(ideas
            .into_iter()
            .filter(|i| i.status == "active")
            .map(|i| to_record(i, &usage))
            .collect())
    }
}

#[async_trait]
impl IdeaStore for FileIdeaStore {
    async fn list_ideas(&self, query: &ListQuery) -> Result<IdeaPage, AppError> {
        let records = self.active_records().await?;
        let (ideas, total_count) = query::run_listing(query, records);
        Ok(IdeaPage { ideas, total_count })
    }

    async fn get_idea(&self, id: i64) -> Result<Option<IdeaRecord>, AppError> {
        let records = self.active_records().await?;
        Ok(records.into_iter().find(|i| i.id == id))
    }

    async fn increment_view_count(&self, id: i64) -> Result<(), AppError> {
        let mut ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        if let Some(idea) = ideas.iter_mut().find(|i| i.id == id) {
            idea.view_count += 1;
            self.save(IDEAS_FILE, &ideas).await?;
        }
        Ok(())
    }

    async fn create_idea(&self, draft: NewIdea) -> Result<i64, AppError> {
        let mut ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        let tags = clean_tags(&draft.tags);

        let existing: Vec<i64> = ideas.iter().map(|i| i.id).collect();
        let id = next_id(&existing);
        ideas.push(StoredIdea {
            id,
            title: draft.title,
            content: draft.content,
            writer: draft.writer,
            created_at: Utc::now(),
            updated_at: None,
            view_count: 0,
            fork_count: 0,
            comment_count: 0,
            status: "active".to_string(),
            tags: tags.clone(),
        });
        self.save(IDEAS_FILE, &ideas).await?;
        self.adjust_tag_usage(&tags, &[]).await?;
        debug!("idea created id={}", id);
        Ok(id)
    }

    async fn update_idea(&self, id: i64, changes: IdeaChanges) -> Result<(), AppError> {
        let mut ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        let new_tags = clean_tags(&changes.tags);
        let old_tags;
        {
            let idea = ideas
                .iter_mut()
                .find(|i| i.id == id && i.status == "active")
                .ok_or_else(|| AppError::not_found("idea not found"))?;
            old_tags = idea.tags.clone();
            idea.title = changes.title;
            idea.content = changes.content;
            idea.updated_at = Some(Utc::now());
            idea.tags = new_tags.clone();
        }
        self.save(IDEAS_FILE, &ideas).await?;
        self.adjust_tag_usage(&new_tags, &old_tags).await?;
        debug!("idea updated id={}", id);
        Ok(())
    }

    async fn soft_delete_idea(&self, id: i64) -> Result<(), AppError> {
        let mut ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        let old_tags;
        match ideas.iter_mut().find(|i| i.id == id && i.status == "active") {
            Some(idea) => {
                old_tags = idea.tags.clone();
                idea.status = "deleted".to_string();
                idea.updated_at = Some(Utc::now());
            }
            None => return Ok(()),
        }
        self.save(IDEAS_FILE, &ideas).await?;

        let mut comments = self.load::<StoredComment>(COMMENTS_FILE).await?;
        let mut touched = false;
        for comment in comments
            .iter_mut()
            .filter(|c| c.idea_id == id && c.status == "active")
        {
            comment.status = "deleted".to_string();
            comment.updated_at = Some(Utc::now());
            touched = true;
        }
        if touched {
            self.save(COMMENTS_FILE, &comments).await?;
        }

        self.adjust_tag_usage(&[], &old_tags).await?;
        debug!("idea deleted id={}", id);
        Ok(())
    }

    async fn list_tags(&self, query: &TagQuery) -> Result<Vec<TagRecord>, AppError> {
        let tags = self.load::<StoredTag>(TAGS_FILE).await?;
        let needle = query.search.to_lowercase();
        let mut records: Vec<TagRecord> = tags
            .into_iter()
            .filter(|t| needle.is_empty() || t.name.to_lowercase().contains(&needle))
            .map(|t| TagRecord {
                id: t.id,
                name: t.name,
                usage_count: t.usage_count,
                created_at: t.created_at,
            })
            .collect();
        query::sort_tags(&mut records, query.sort);
        records.truncate(query.limit as usize);
        Ok(records)
    }

    async fn create_comment(&self, draft: NewComment) -> Result<i64, AppError> {
        let mut ideas = self.load::<StoredIdea>(IDEAS_FILE).await?;
        let idea = ideas
            .iter_mut()
            .find(|i| i.id == draft.idea_id && i.status == "active")
            .ok_or_else(|| AppError::not_found("idea not found"))?;
        idea.comment_count += 1;

        let mut comments = self.load::<StoredComment>(COMMENTS_FILE).await?;
        let existing: Vec<i64> = comments.iter().map(|c| c.id).collect();
        let id = next_id(&existing);
        comments.push(StoredComment {
            id,
            idea_id: draft.idea_id,
            writer: draft.writer,
            content: draft.content,
            parent_comment_id: draft.parent_comment_id,
            created_at: Utc::now(),
            updated_at: None,
            status: "active".to_string(),
        });

        self.save(COMMENTS_FILE, &comments).await?;
        self.save(IDEAS_FILE, &ideas).await?;
        debug!("comment created id={}", id);
        Ok(id)
    }

    async fn comments_for_idea(&self, idea_id: i64) -> Result<Vec<CommentRecord>, AppError> {
        let comments = self.load::<StoredComment>(COMMENTS_FILE).await?;
        let mut records: Vec<CommentRecord> = comments
            .into_iter()
            .filter(|c| c.idea_id == idea_id && c.status == "active")
            .map(|c| CommentRecord {
                id: c.id,
                writer: c.writer,
                content: c.content,
                created_at: c.created_at,
            })
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records.truncate(50);
        Ok(records)
    }

    async fn related_ideas(&self, idea_id: i64) -> Result<Vec<RelatedIdea>, AppError> {
        let records = self.active_records().await?;
        let Some(target) = records.iter().find(|i| i.id == idea_id) else {
            return Ok(Vec::new());
        };
        let target_tags = target.tags.clone();
        let mut related: Vec<&IdeaRecord> = records
            .iter()
            .filter(|i| i.id != idea_id && i.tags.iter().any(|t| target_tags.contains(t)))
            .collect();
        related.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(related
            .into_iter()
            .take(5)
            .map(|i| RelatedIdea {
                id: i.id,
                title: i.title.clone(),
                writer: i.writer.clone(),
                created_at: i.created_at,
                view_count: i.view_count,
                fork_count: i.fork_count,
                comment_count: i.comment_count,
            })
            .collect())
    }
}

impl FileIdeaStore {
    /// Applies one idea's tag-set change to the tags document: +1 per added
    /// link, -1 per removed link (floored at zero), creating tags on first
    /// use. Tags are kept even when their usage drops to zero.
    async fn adjust_tag_usage(&self, added: &[String], removed: &[String]) -> Result<(), AppError> {
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }
        let mut tags = self.load::<StoredTag>(TAGS_FILE).await?;
        for name in added {
            match tags.iter_mut().find(|t| &t.name == name) {
                Some(tag) => tag.usage_count += 1,
                None => {
                    let existing: Vec<i64> = tags.iter().map(|t| t.id).collect();
                    tags.push(StoredTag {
                        id: next_id(&existing),
                        name: name.clone(),
                        usage_count: 1,
                        created_at: Utc::now(),
                    });
                }
            }
        }
        for name in removed {
            if let Some(tag) = tags.iter_mut().find(|t| &t.name == name) {
                tag.usage_count = (tag.usage_count - 1).max(0);
            }
        }
        self.save(TAGS_FILE, &tags).await
    }
}

/// Ids are unix-seconds plus a random suffix rather than a sequence, so they
/// stay roughly time-ordered without a coordinator; regenerate on the rare
/// collision within one document.
fn next_id(existing: &[i64]) -> i64 {
    let mut rng = rand::thread_rng();
    loop {
        let id = Utc::now().timestamp() + rng.gen_range(1000..10_000);
        if !existing.contains(&id) {
            return id;
        }
    }
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || cleaned.iter().any(|t| t == tag) {
            continue;
        }
        cleaned.push(tag.to_string());
    }
    cleaned
}

fn usage_by_name(tags: &[StoredTag]) -> HashMap<String, i64> {
    tags.iter()
        .map(|t| (t.name.clone(), t.usage_count))
        .collect()
}

fn to_record(idea: StoredIdea, usage: &HashMap<String, i64>) -> IdeaRecord {
    let mut tags = idea.tags;
    // Same ordering convention as the relational backend's tag join.
    tags.sort_by(|a, b| {
        let ua = usage.get(a).copied().unwrap_or(0);
        let ub = usage.get(b).copied().unwrap_or(0);
        ub.cmp(&ua).then_with(|| a.cmp(b))
    });
    IdeaRecord {
        id: idea.id,
        title: idea.title,
        content: idea.content,
        writer: idea.writer,
        created_at: idea.created_at,
        updated_at: idea.updated_at,
        view_count: idea.view_count,
        fork_count: idea.fork_count,
        comment_count: idea.comment_count,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ListQuery, PageLimits, RawListQuery, RawTagQuery};
    use tempfile::TempDir;

    fn listing(raw: RawListQuery) -> ListQuery {
        ListQuery::from_raw(raw, &PageLimits { default: 10, max: 50 })
    }

    fn draft(title: &str, writer: &str, tags: &[&str]) -> NewIdea {
        NewIdea {
            title: title.to_string(),
            content: format!("{} body", title),
            writer: writer.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[actix_rt::test]
    async fn state_lives_on_disk_not_in_the_store() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FileIdeaStore::new(dir.path());
            store.create_idea(draft("Persisted", "hana", &["web"])).await.unwrap()
        };

        // A fresh store over the same directory sees everything.
        let store = FileIdeaStore::new(dir.path());
        let idea = store.get_idea(id).await.unwrap().unwrap();
        assert_eq!(idea.title, "Persisted");
        assert_eq!(idea.tags, vec!["web".to_string()]);
    }

    #[actix_rt::test]
    async fn missing_files_read_as_empty_collections() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        let page = store.list_ideas(&listing(RawListQuery::default())).await.unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.ideas.is_empty());
        assert!(store
            .list_tags(&TagQuery::from_raw(RawTagQuery::default()))
            .await
            .unwrap()
            .is_empty());
    }

    #[actix_rt::test]
    async fn view_counts_persist_across_reads() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        let id = store.create_idea(draft("Seen", "hana", &[])).await.unwrap();
        store.increment_view_count(id).await.unwrap();
        store.increment_view_count(id).await.unwrap();
        let idea = store.get_idea(id).await.unwrap().unwrap();
        assert_eq!(idea.view_count, 2);
    }

    #[actix_rt::test]
    async fn soft_delete_cascades_and_releases_tags() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        let id = store.create_idea(draft("Doomed", "hana", &["web"])).await.unwrap();
        store
            .create_comment(NewComment {
                idea_id: id,
                writer: "duri".to_string(),
                content: "hello".to_string(),
                parent_comment_id: None,
            })
            .await
            .unwrap();

        store.soft_delete_idea(id).await.unwrap();

        assert!(store.get_idea(id).await.unwrap().is_none());
        assert!(store.comments_for_idea(id).await.unwrap().is_empty());
        let tags = store
            .list_tags(&TagQuery::from_raw(RawTagQuery::default()))
            .await
            .unwrap();
        assert_eq!(tags.len(), 1, "tags persist at zero usage");
        assert_eq!(tags[0].usage_count, 0);
    }

    #[actix_rt::test]
    async fn editing_replaces_the_tag_set() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        let id = store.create_idea(draft("Mutable", "hana", &["old"])).await.unwrap();
        store
            .update_idea(
                id,
                IdeaChanges {
                    title: "Mutable v2".to_string(),
                    content: "new body".to_string(),
                    tags: vec!["new".to_string()],
                },
            )
            .await
            .unwrap();

        let idea = store.get_idea(id).await.unwrap().unwrap();
        assert_eq!(idea.title, "Mutable v2");
        assert_eq!(idea.tags, vec!["new".to_string()]);
        assert!(idea.updated_at.is_some());

        let tags = store
            .list_tags(&TagQuery::from_raw(RawTagQuery {
                sort: Some("name".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();
        let old = tags.iter().find(|t| t.name == "old").unwrap();
        let new = tags.iter().find(|t| t.name == "new").unwrap();
        assert_eq!(old.usage_count, 0);
        assert_eq!(new.usage_count, 1);
    }

    #[actix_rt::test]
    async fn comment_on_missing_idea_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        let err = store
            .create_comment(NewComment {
                idea_id: 12345,
                writer: "duri".to_string(),
                content: "void".to_string(),
                parent_comment_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn page_past_the_end_is_empty_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileIdeaStore::new(dir.path());
        store.create_idea(draft("Only", "hana", &[])).await.unwrap();

        let query = listing(RawListQuery {
            page: Some("7".to_string()),
            ..Default::default()
        });
        let page = store.list_ideas(&query).await.unwrap();
        assert!(page.ideas.is_empty());
        assert_eq!(page.total_count, 1);
    }
}
