//! Listing query pipeline: parameter normalization, filtering, sorting and
//! page-window computation.
//!
//! Both storage backends answer the same logical query. The flat-file backend
//! runs `filter_ideas` / `sort_ideas` / `page_window` directly over its
//! in-memory collection; the relational backend uses the SQL mirrors
//! (`IdeaFilters::push_sql`, `ListQuery::order_by`) so the two never drift.

use serde::Deserialize;

use crate::store::{IdeaRecord, TagRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    ViewCount,
    ForkCount,
    CommentCount,
    Title,
}

impl SortKey {
    /// Unknown values fall back to `created_at`. The leniency is contractual:
    /// sort/order/page/limit are normalized, never rejected.
    pub fn parse_or_default(input: &str) -> Self {
        match input {
            "created_at" => Self::CreatedAt,
            "view_count" => Self::ViewCount,
            "fork_count" => Self::ForkCount,
            "comment_count" => Self::CommentCount,
            "title" => Self::Title,
            _ => Self::CreatedAt,
        }
    }

    /// Column name, doubling as the echo value in the `filters` block.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::ViewCount => "view_count",
            Self::ForkCount => "fork_count",
            Self::CommentCount => "comment_count",
            Self::Title => "title",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse_or_default(input: &str) -> Self {
        if input.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IdeaFilters {
    pub search: String,
    pub tag: String,
    pub writer: String,
}

impl IdeaFilters {
    /// AND-composition of the non-empty predicates; an empty filter set
    /// passes everything through.
    pub fn matches(&self, idea: &IdeaRecord) -> bool {
        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            if !idea.title.to_lowercase().contains(&needle)
                && !idea.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if !self.tag.is_empty() && !idea.tags.iter().any(|t| t == &self.tag) {
            return false;
        }
        if !self.writer.is_empty() {
            let needle = self.writer.to_lowercase();
            if !idea.writer.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }

    /// SQL mirror of `matches`, appended to an existing WHERE list.
    /// The `i` alias refers to the `ideas` table.
    pub fn push_sql(&self, where_sql: &mut Vec<String>, values: &mut Vec<sea_orm::Value>) {
        if !self.search.is_empty() {
            where_sql.push("(i.title like ? or i.content like ?)".to_string());
            let pattern = format!("%{}%", self.search);
            values.push(pattern.clone().into());
            values.push(pattern.into());
        }
        if !self.tag.is_empty() {
            where_sql.push(
                "i.id in (select it.idea_id from idea_tags it \
                 join tags t on t.id = it.tag_id where t.name = ?)"
                    .to_string(),
            );
            values.push(self.tag.clone().into());
        }
        if !self.writer.is_empty() {
            where_sql.push("i.writer like ?".to_string());
            values.push(format!("%{}%", self.writer).into());
        }
    }
}

/// Raw, untrusted query-string input for the idea listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub writer: Option<String>,
}

/// Items-per-page settings, injected from configuration.
#[derive(Clone, Copy, Debug)]
pub struct PageLimits {
    pub default: i64,
    pub max: i64,
}

/// A fully normalized listing query. Constructing one is the only place
/// where defaults and clamping are applied.
#[derive(Clone, Debug)]
pub struct ListQuery {
    pub page: i64,
    pub limit: i64,
    pub sort: SortKey,
    pub order: SortOrder,
    pub filters: IdeaFilters,
}

impl ListQuery {
    pub fn from_raw(raw: RawListQuery, limits: &PageLimits) -> Self {
        let page = parse_int(raw.page.as_deref()).unwrap_or(1).max(1);
        let limit = parse_int(raw.limit.as_deref())
            .unwrap_or(limits.default)
            .clamp(1, limits.max);
        Self {
            page,
            limit,
            sort: SortKey::parse_or_default(raw.sort.as_deref().unwrap_or("")),
            order: SortOrder::parse_or_default(raw.order.as_deref().unwrap_or("")),
            filters: IdeaFilters {
                search: raw.search.unwrap_or_default(),
                tag: raw.tag.unwrap_or_default(),
                writer: raw.writer.unwrap_or_default(),
            },
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// ORDER BY clause for the relational backend. The secondary
    /// `created_at DESC` tie-break applies regardless of the primary sort.
    pub fn order_by(&self) -> String {
        format!(
            "i.{} {}, i.created_at desc",
            self.sort.as_str(),
            self.order.as_str()
        )
    }
}

fn parse_int(input: Option<&str>) -> Option<i64> {
    input.and_then(|v| v.trim().parse::<i64>().ok())
}

pub fn filter_ideas(ideas: Vec<IdeaRecord>, filters: &IdeaFilters) -> Vec<IdeaRecord> {
    ideas.into_iter().filter(|i| filters.matches(i)).collect()
}

/// Orders by the primary key field, then `created_at DESC` on ties so that
/// duplicate primary values (e.g. many ideas with view_count=0) still yield
/// a deterministic order.
pub fn sort_ideas(ideas: &mut [IdeaRecord], sort: SortKey, order: SortOrder) {
    ideas.sort_by(|a, b| {
        let primary = match sort {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::ViewCount => a.view_count.cmp(&b.view_count),
            SortKey::ForkCount => a.fork_count.cmp(&b.fork_count),
            SortKey::CommentCount => a.comment_count.cmp(&b.comment_count),
            SortKey::Title => a.title.cmp(&b.title),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// The requested page is taken at face value: a page past the end produces
/// an empty window, never an error.
pub fn page_window<T>(items: Vec<T>, page: i64, limit: i64) -> Vec<T> {
    let offset = (page - 1) * limit;
    items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

/// Full in-memory pipeline: filter, sort, slice. Returns the window and the
/// filtered total.
pub fn run_listing(query: &ListQuery, ideas: Vec<IdeaRecord>) -> (Vec<IdeaRecord>, i64) {
    let mut kept = filter_ideas(ideas, &query.filters);
    sort_ideas(&mut kept, query.sort, query.order);
    let total = kept.len() as i64;
    (page_window(kept, query.page, query.limit), total)
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub per_page: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// `page` is the raw requested page, deliberately not clamped to
    /// `total_pages`: a request past the end reports has_prev from the
    /// requested number and has_next=false.
    pub fn compute(total_count: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + limit - 1) / limit
        };
        Self {
            current_page: page,
            total_pages,
            total_count,
            per_page: limit,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagSortKey {
    UsageCount,
    Name,
    CreatedAt,
}

impl TagSortKey {
    pub fn parse_or_default(input: &str) -> Self {
        match input {
            "usage_count" => Self::UsageCount,
            "name" => Self::Name,
            "created_at" => Self::CreatedAt,
            _ => Self::UsageCount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsageCount => "usage_count",
            Self::Name => "name",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawTagQuery {
    pub search: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TagQuery {
    pub search: String,
    pub limit: i64,
    pub sort: TagSortKey,
}

impl TagQuery {
    pub fn from_raw(raw: RawTagQuery) -> Self {
        Self {
            search: raw.search.unwrap_or_default(),
            limit: parse_int(raw.limit.as_deref()).unwrap_or(20).clamp(1, 50),
            sort: TagSortKey::parse_or_default(raw.sort.as_deref().unwrap_or("")),
        }
    }
}

/// Tag listings order by the selected field descending with `name ASC`
/// breaking ties; the SQL backend renders the same clause.
pub fn sort_tags(tags: &mut [TagRecord], sort: TagSortKey) {
    tags.sort_by(|a, b| {
        let primary = match sort {
            TagSortKey::UsageCount => b.usage_count.cmp(&a.usage_count),
            TagSortKey::Name => b.name.cmp(&a.name),
            TagSortKey::CreatedAt => b.created_at.cmp(&a.created_at),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn limits() -> PageLimits {
        PageLimits { default: 10, max: 50 }
    }

    fn idea(id: i64, title: &str, offset_minutes: i64) -> IdeaRecord {
        IdeaRecord {
            id,
            title: title.to_string(),
            content: format!("content of {}", title),
            writer: "writer".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + Duration::minutes(offset_minutes),
            updated_at: None,
            view_count: 0,
            fork_count: 0,
            comment_count: 0,
            tags: Vec::new(),
        }
    }

    fn raw(pairs: &[(&str, &str)]) -> RawListQuery {
        let mut raw = RawListQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "page" => raw.page = value,
                "limit" => raw.limit = value,
                "sort" => raw.sort = value,
                "order" => raw.order = value,
                "search" => raw.search = value,
                "tag" => raw.tag = value,
                "writer" => raw.writer = value,
                other => panic!("unknown key {}", other),
            }
        }
        raw
    }

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let query = ListQuery::from_raw(RawListQuery::default(), &limits());
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort, SortKey::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
    }

    #[test]
    fn invalid_sort_and_order_fall_back_silently() {
        let query = ListQuery::from_raw(raw(&[("sort", "foo"), ("order", "sideways")]), &limits());
        assert_eq!(query.sort, SortKey::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
    }

    #[test]
    fn order_is_case_insensitive() {
        let query = ListQuery::from_raw(raw(&[("order", "asc")]), &limits());
        assert_eq!(query.order, SortOrder::Asc);
    }

    #[test]
    fn page_and_limit_are_clamped_not_rejected() {
        let query = ListQuery::from_raw(raw(&[("page", "-3"), ("limit", "500")]), &limits());
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 50);

        let query = ListQuery::from_raw(raw(&[("page", "abc"), ("limit", "0")]), &limits());
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 1);
    }

    #[test]
    fn search_matches_title_or_content_case_insensitively() {
        let mut a = idea(1, "Rust Web Services", 0);
        a.content = "nothing here".to_string();
        let mut b = idea(2, "unrelated", 1);
        b.content = "all about RUST internals".to_string();
        let c = idea(3, "unrelated too", 2);

        let filters = IdeaFilters { search: "rust".to_string(), ..Default::default() };
        let kept = filter_ideas(vec![a, b, c], &filters);
        let ids: Vec<i64> = kept.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn tag_filter_is_exact_membership() {
        let mut a = idea(1, "a", 0);
        a.tags = vec!["web".to_string(), "rust".to_string()];
        let mut b = idea(2, "b", 1);
        b.tags = vec!["webdev".to_string()];

        let filters = IdeaFilters { tag: "web".to_string(), ..Default::default() };
        let kept = filter_ideas(vec![a, b], &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn combined_filters_are_the_intersection() {
        let mut a = idea(1, "shared topic", 0);
        a.tags = vec!["go".to_string()];
        let mut b = idea(2, "shared topic", 1);
        b.tags = vec!["rust".to_string()];
        let mut c = idea(3, "other", 2);
        c.tags = vec!["rust".to_string()];
        let pool = vec![a, b, c];

        let search_only = IdeaFilters { search: "shared".to_string(), ..Default::default() };
        let tag_only = IdeaFilters { tag: "rust".to_string(), ..Default::default() };
        let both = IdeaFilters {
            search: "shared".to_string(),
            tag: "rust".to_string(),
            ..Default::default()
        };

        let by_search: Vec<i64> =
            filter_ideas(pool.clone(), &search_only).iter().map(|i| i.id).collect();
        let by_tag: Vec<i64> = filter_ideas(pool.clone(), &tag_only).iter().map(|i| i.id).collect();
        let by_both: Vec<i64> = filter_ideas(pool, &both).iter().map(|i| i.id).collect();

        let intersection: Vec<i64> =
            by_search.iter().copied().filter(|id| by_tag.contains(id)).collect();
        assert_eq!(by_both, intersection);
        assert_eq!(by_both, vec![2]);
    }

    #[test]
    fn ties_break_on_created_at_desc_for_any_primary_direction() {
        let mut older = idea(1, "same", 0);
        older.view_count = 7;
        let mut newer = idea(2, "same", 30);
        newer.view_count = 7;

        let mut ideas = vec![older.clone(), newer.clone()];
        sort_ideas(&mut ideas, SortKey::ViewCount, SortOrder::Desc);
        assert_eq!(ideas[0].id, 2);

        let mut ideas = vec![older, newer];
        sort_ideas(&mut ideas, SortKey::ViewCount, SortOrder::Asc);
        assert_eq!(ideas[0].id, 2);
    }

    #[test]
    fn title_sort_uses_plain_string_ordering() {
        let mut ideas = vec![idea(1, "banana", 0), idea(2, "apple", 1), idea(3, "cherry", 2)];
        sort_ideas(&mut ideas, SortKey::Title, SortOrder::Asc);
        let titles: Vec<&str> = ideas.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn pagination_meta_follows_the_ceiling_formula() {
        let meta = Pagination::compute(23, 1, 10);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(!meta.has_prev);

        let meta = Pagination::compute(23, 3, 10);
        assert!(!meta.has_next);
        assert!(meta.has_prev);

        let meta = Pagination::compute(0, 1, 10);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn page_past_the_end_is_empty_but_meta_is_unclamped() {
        let ideas: Vec<IdeaRecord> = (0..23).map(|n| idea(n, "t", n)).collect();
        let window = page_window(ideas, 4, 10);
        assert!(window.is_empty());

        let meta = Pagination::compute(23, 4, 10);
        assert_eq!(meta.current_page, 4);
        assert!(meta.has_prev);
        assert!(!meta.has_next);
    }

    #[test]
    fn window_sizes_match_the_twenty_three_item_example() {
        let ideas: Vec<IdeaRecord> = (0..23).map(|n| idea(n, "t", n)).collect();
        assert_eq!(page_window(ideas.clone(), 1, 10).len(), 10);
        assert_eq!(page_window(ideas.clone(), 2, 10).len(), 10);
        assert_eq!(page_window(ideas, 3, 10).len(), 3);
    }

    #[test]
    fn run_listing_is_idempotent() {
        let pool: Vec<IdeaRecord> = (0..15).map(|n| idea(n, "t", n)).collect();
        let query = ListQuery::from_raw(raw(&[("page", "2"), ("limit", "5")]), &limits());
        let (first, total_a) = run_listing(&query, pool.clone());
        let (second, total_b) = run_listing(&query, pool);
        let ids_a: Vec<i64> = first.iter().map(|i| i.id).collect();
        let ids_b: Vec<i64> = second.iter().map(|i| i.id).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(total_a, total_b);
    }

    #[test]
    fn tag_query_falls_back_to_usage_count() {
        let query = TagQuery::from_raw(RawTagQuery {
            sort: Some("bogus".to_string()),
            limit: Some("999".to_string()),
            search: None,
        });
        assert_eq!(query.sort, TagSortKey::UsageCount);
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn tag_sort_breaks_ties_by_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut tags = vec![
            TagRecord { id: 1, name: "zeta".to_string(), usage_count: 3, created_at: at },
            TagRecord { id: 2, name: "alpha".to_string(), usage_count: 3, created_at: at },
            TagRecord { id: 3, name: "mid".to_string(), usage_count: 9, created_at: at },
        ];
        sort_tags(&mut tags, TagSortKey::UsageCount);
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["mid", "alpha", "zeta"]);
    }
}
