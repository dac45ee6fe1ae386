use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::db::error::{DataError, DataResult};
use crate::db::{Comment, Store};
use crate::services::gravatar::gravatar_hash;

/// Client-facing document for one comment and its descendant subtree.
#[derive(Debug, Serialize)]
pub struct CommentNode {
    pub id: String,
    pub text: String,
    pub parent: Option<String>,
    pub user: CommentAuthor,
    pub page: String,
    pub children: Vec<CommentNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentAuthor {
    pub id: i32,
    pub username: String,
    pub gravatar: String,
}

/// Builds nested comment documents from bulk fetches.
///
/// One query loads every comment on the page and one loads the referenced
/// users; the tree is then assembled in memory, deepest nodes first, so the
/// cost per request is two round-trips regardless of tree shape and there
/// is no unbounded recursion.
pub struct CommentTreeService {
    store: Store,
}

impl CommentTreeService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Serialize every comment thread on a page: a forest of root
    /// documents in storage order.
    pub async fn page_thread(&self, page_id: &str) -> DataResult<Vec<CommentNode>> {
        self.store
            .get_page(page_id)
            .await?
            .ok_or_else(|| DataError::not_found("page", page_id))?;

        let comments = self.store.list_comments_for_page(page_id).await?;
        self.assemble(comments).await
    }

    /// Serialize a single comment together with its full descendant
    /// subtree.
    pub async fn comment_subtree(&self, comment_id: &str) -> DataResult<CommentNode> {
        let root = self
            .store
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| DataError::not_found("comment", comment_id))?;

        let page_comments = self.store.list_comments_for_page(&root.page_id).await?;
        let subtree = descendants_of(&root.id, page_comments);

        let mut forest = self.assemble(subtree).await?;
        forest
            .pop()
            .ok_or_else(|| DataError::Internal(format!("comment {comment_id} vanished mid-read")))
    }

    /// Turn a flat comment set into nested documents. A comment whose
    /// parent is absent from the set (or null) becomes a root.
    async fn assemble(&self, comments: Vec<Comment>) -> DataResult<Vec<CommentNode>> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let authors = self.load_authors(&comments).await?;
        let depths = compute_depths(&comments)?;

        let mut nodes: HashMap<String, CommentNode> = HashMap::with_capacity(comments.len());
        for comment in &comments {
            let author = authors.get(&comment.user_id).ok_or_else(|| {
                DataError::ReferentialIntegrity(format!(
                    "comment {} references missing user {}",
                    comment.id, comment.user_id
                ))
            })?;
            nodes.insert(
                comment.id.clone(),
                CommentNode {
                    id: comment.id.clone(),
                    text: comment.text.clone(),
                    parent: comment.parent_id.clone(),
                    user: author.clone(),
                    page: comment.page_id.clone(),
                    children: Vec::new(),
                },
            );
        }

        // Attach deepest nodes first so every child is complete before it
        // is moved into its parent. Siblings keep storage order because
        // the inner pass follows the fetch order.
        let max_depth = depths.values().copied().max().unwrap_or(0);
        for depth in (1..=max_depth).rev() {
            for comment in &comments {
                if depths.get(&comment.id).copied() != Some(depth) {
                    continue;
                }
                let node = nodes.remove(&comment.id).ok_or_else(|| {
                    DataError::Internal(format!("comment {} assembled twice", comment.id))
                })?;
                let parent_id = comment.parent_id.as_deref().ok_or_else(|| {
                    DataError::Internal(format!("comment {} has depth but no parent", comment.id))
                })?;
                let parent = nodes.get_mut(parent_id).ok_or_else(|| {
                    DataError::Internal(format!("parent {parent_id} missing during assembly"))
                })?;
                parent.children.push(node);
            }
        }

        let mut roots = Vec::new();
        for comment in &comments {
            if depths.get(&comment.id).copied() == Some(0)
                && let Some(node) = nodes.remove(&comment.id)
            {
                roots.push(node);
            }
        }

        Ok(roots)
    }

    /// One bulk user fetch for the whole tree; gravatar hashes are computed
    /// once per author. A blank email fails the response here rather than
    /// embedding a misleading hash.
    async fn load_authors(&self, comments: &[Comment]) -> DataResult<HashMap<i32, CommentAuthor>> {
        let mut user_ids: Vec<i32> = comments.iter().map(|c| c.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let users = self.store.get_users_by_ids(&user_ids).await?;

        let mut authors = HashMap::with_capacity(users.len());
        for user in users {
            let gravatar = gravatar_hash(&user.email)?;
            authors.insert(
                user.id,
                CommentAuthor {
                    id: user.id,
                    username: user.username,
                    gravatar,
                },
            );
        }
        Ok(authors)
    }
}

/// Restrict a page's comments to one comment and its transitive children,
/// preserving fetch order. The walk tracks visited ids so a corrupted
/// cyclic chain cannot keep it spinning; the cycle itself is reported by
/// `compute_depths` during assembly.
fn descendants_of(root_id: &str, comments: Vec<Comment>) -> Vec<Comment> {
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for comment in &comments {
        if let Some(parent_id) = &comment.parent_id {
            children_of
                .entry(parent_id.as_str())
                .or_default()
                .push(comment.id.as_str());
        }
    }

    let mut keep: HashSet<String> = HashSet::new();
    let mut stack: Vec<&str> = vec![root_id];
    while let Some(current) = stack.pop() {
        if !keep.insert(current.to_string()) {
            continue;
        }
        if let Some(kids) = children_of.get(current) {
            stack.extend(kids);
        }
    }

    comments
        .into_iter()
        .filter(|c| keep.contains(&c.id))
        .collect()
}

/// Depth of every comment relative to the roots of the given set. Walking
/// parent links is guarded, so a corrupted cyclic chain surfaces as an
/// error instead of spinning.
fn compute_depths(comments: &[Comment]) -> DataResult<HashMap<String, usize>> {
    let by_id: HashMap<&str, &Comment> = comments.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut depths: HashMap<String, usize> = HashMap::with_capacity(comments.len());

    for comment in comments {
        if depths.contains_key(&comment.id) {
            continue;
        }

        let mut chain: Vec<&str> = Vec::new();
        let mut current = *by_id
            .get(comment.id.as_str())
            .ok_or_else(|| DataError::Internal("comment index out of sync".to_string()))?;

        let mut next_depth = loop {
            if let Some(&known) = depths.get(current.id.as_str()) {
                break known + 1;
            }
            chain.push(current.id.as_str());
            if chain.len() > comments.len() {
                return Err(DataError::ReferentialIntegrity(
                    "comment parent chain contains a cycle".to_string(),
                ));
            }
            match current
                .parent_id
                .as_deref()
                .and_then(|p| by_id.get(p).copied())
            {
                Some(parent) => current = parent,
                None => break 0,
            }
        };

        for id in chain.iter().rev() {
            depths.insert((*id).to_string(), next_depth);
            next_depth += 1;
        }
    }

    Ok(depths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewComment, NewUser, Store};

    async fn test_store() -> Store {
        Store::new("sqlite::memory:")
            .await
            .expect("in-memory store")
    }

    async fn seed_user(store: &Store, username: &str) -> i32 {
        let (user, _token) = store
            .create_user(
                NewUser {
                    username: username.to_string(),
                    email: format!("{username}@example.com"),
                    password: "hunter2-longer".to_string(),
                },
                None,
            )
            .await
            .expect("create user");
        user.id
    }

    async fn seed_comment(
        store: &Store,
        user_id: i32,
        page_id: &str,
        parent_id: Option<&str>,
        text: &str,
    ) -> String {
        store
            .create_comment(NewComment {
                text: text.to_string(),
                user_id,
                page_id: page_id.to_string(),
                parent_id: parent_id.map(ToString::to_string),
            })
            .await
            .expect("create comment")
            .id
    }

    #[tokio::test]
    async fn test_children_match_direct_child_count() {
        let store = test_store().await;
        let user_id = seed_user(&store, "carol").await;
        let page = store.create_page("notes", user_id).await.unwrap();

        let root = seed_comment(&store, user_id, &page.id, None, "root").await;
        for i in 0..3 {
            seed_comment(&store, user_id, &page.id, Some(&root), &format!("r{i}")).await;
        }

        let service = CommentTreeService::new(store);
        let thread = service.page_thread(&page.id).await.unwrap();

        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].children.len(), 3);
        for child in &thread[0].children {
            assert_eq!(child.parent.as_deref(), Some(root.as_str()));
            assert_eq!(child.page, page.id);
        }
    }

    #[tokio::test]
    async fn test_five_level_chain_nests_five_deep() {
        let store = test_store().await;
        let user_id = seed_user(&store, "dave").await;
        let page = store.create_page("thread", user_id).await.unwrap();

        let mut parent: Option<String> = None;
        for i in 0..5 {
            let id = seed_comment(
                &store,
                user_id,
                &page.id,
                parent.as_deref(),
                &format!("level {i}"),
            )
            .await;
            parent = Some(id);
        }

        let service = CommentTreeService::new(store);
        let thread = service.page_thread(&page.id).await.unwrap();
        assert_eq!(thread.len(), 1);

        let mut depth = 0;
        let mut node = &thread[0];
        loop {
            assert!(node.children.len() <= 1);
            depth += 1;
            match node.children.first() {
                Some(child) => node = child,
                None => break,
            }
        }
        assert_eq!(depth, 5);
    }

    #[tokio::test]
    async fn test_subtree_serializes_from_interior_node() {
        let store = test_store().await;
        let user_id = seed_user(&store, "erin").await;
        let page = store.create_page("deep", user_id).await.unwrap();

        let root = seed_comment(&store, user_id, &page.id, None, "root").await;
        let mid = seed_comment(&store, user_id, &page.id, Some(&root), "mid").await;
        let leaf = seed_comment(&store, user_id, &page.id, Some(&mid), "leaf").await;
        seed_comment(&store, user_id, &page.id, None, "unrelated root").await;

        let service = CommentTreeService::new(store);
        let subtree = service.comment_subtree(&mid).await.unwrap();

        assert_eq!(subtree.id, mid);
        // The interior node keeps its real parent id in the document.
        assert_eq!(subtree.parent.as_deref(), Some(root.as_str()));
        assert_eq!(subtree.children.len(), 1);
        assert_eq!(subtree.children[0].id, leaf);
    }

    #[tokio::test]
    async fn test_sibling_order_follows_storage_order() {
        let store = test_store().await;
        let user_id = seed_user(&store, "frank").await;
        let page = store.create_page("ordered", user_id).await.unwrap();

        let first = seed_comment(&store, user_id, &page.id, None, "first").await;
        let second = seed_comment(&store, user_id, &page.id, None, "second").await;
        let third = seed_comment(&store, user_id, &page.id, None, "third").await;

        let service = CommentTreeService::new(store);
        let thread = service.page_thread(&page.id).await.unwrap();

        let ids: Vec<&str> = thread.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str(), third.as_str()]);
    }

    #[tokio::test]
    async fn test_gravatar_matches_author_email() {
        let store = test_store().await;
        let user_id = seed_user(&store, "grace").await;
        let page = store.create_page("avatars", user_id).await.unwrap();
        seed_comment(&store, user_id, &page.id, None, "hello").await;

        let service = CommentTreeService::new(store);
        let thread = service.page_thread(&page.id).await.unwrap();

        let expected = gravatar_hash("grace@example.com").unwrap();
        assert_eq!(thread[0].user.gravatar, expected);
        assert_eq!(thread[0].user.username, "grace");
    }

    #[test]
    fn test_cycle_in_parent_chain_is_reported() {
        let a = Comment {
            id: "a".to_string(),
            text: "a".to_string(),
            user_id: 1,
            page_id: "p".to_string(),
            parent_id: Some("b".to_string()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let b = Comment {
            parent_id: Some("a".to_string()),
            id: "b".to_string(),
            ..a.clone()
        };

        let err = compute_depths(&[a, b]).unwrap_err();
        assert!(matches!(err, DataError::ReferentialIntegrity(_)));
    }

    #[test]
    fn test_descendant_walk_terminates_on_cycle() {
        let a = Comment {
            id: "a".to_string(),
            text: "a".to_string(),
            user_id: 1,
            page_id: "p".to_string(),
            parent_id: Some("b".to_string()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let b = Comment {
            parent_id: Some("a".to_string()),
            id: "b".to_string(),
            ..a.clone()
        };

        // The walk must not spin on the corrupted chain; both nodes are
        // collected once and the cycle is reported during assembly.
        let subtree = descendants_of("a", vec![a, b]);
        assert_eq!(subtree.len(), 2);
    }
}
