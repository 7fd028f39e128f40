//! In-memory repository fakes and router plumbing shared by the
//! integration suites. The fakes mirror the schema contracts: the
//! follow table's uniqueness and self-follow constraints, comment
//! cascade on post deletion, and group-reference clearing on group
//! deletion.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{
    Request, Response,
    header::{CONTENT_TYPE, COOKIE},
};
use http_body_util::BodyExt;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use verso::application::feed::FeedService;
use verso::application::follows::FollowService;
use verso::application::pagination::PageBounds;
use verso::application::posts::PostService;
use verso::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostScope, PostsRepo, RepoError,
    SessionsRepo, UpdatePostParams, UsersRepo,
};
use verso::cache::{CacheConfig, CacheState, Clock, PageCache};
use verso::domain::entities::{
    CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, SessionRecord, UserRecord,
};
use verso::infra::http::{HttpState, SESSION_COOKIE, build_router};
use verso::infra::media::MediaStorage;

const BASE_TIMESTAMP: i64 = 1_700_000_000;

#[derive(Default)]
struct StoreInner {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
    seq: i64,
}

impl StoreInner {
    // Strictly increasing timestamps keep newest-first ordering
    // deterministic without sleeping.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        self.seq += 1;
        OffsetDateTime::from_unix_timestamp(BASE_TIMESTAMP + self.seq * 60)
            .expect("timestamp in range")
    }
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store lock")
    }

    // ------------------------------------------------------------------
    // Seeding helpers
    // ------------------------------------------------------------------

    pub fn add_user(&self, username: &str) -> UserRecord {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: None,
            created_at,
        };
        inner.users.push(user.clone());
        user
    }

    pub fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            created_at,
        };
        inner.groups.push(group.clone());
        group
    }

    pub fn add_post(
        &self,
        author: &UserRecord,
        body: &str,
        group: Option<&GroupRecord>,
    ) -> PostRecord {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let post = PostRecord {
            id: Uuid::new_v4(),
            body: body.to_string(),
            author_id: author.id,
            author_username: author.username.clone(),
            group: group.map(|group| GroupRef {
                id: group.id,
                slug: group.slug.clone(),
                title: group.title.clone(),
            }),
            image_path: None,
            created_at,
        };
        inner.posts.push(post.clone());
        post
    }

    pub fn add_comment(&self, author: &UserRecord, post: &PostRecord, body: &str) -> CommentRecord {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: post.id,
            author_id: author.id,
            author_username: author.username.clone(),
            body: body.to_string(),
            created_at,
        };
        inner.comments.push(comment.clone());
        comment
    }

    /// Mint a session token the way the external auth flow would. The
    /// deadline is anchored to wall-clock time because the session
    /// extractor checks expiry against the real clock.
    pub fn add_session(&self, user: &UserRecord) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        inner.sessions.push(SessionRecord {
            token: token.clone(),
            user_id: user.id,
            created_at,
            expires_at: OffsetDateTime::now_utc() + Duration::days(30),
        });
        token
    }

    /// A token whose session deadline has already passed.
    pub fn add_expired_session(&self, user: &UserRecord) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        inner.sessions.push(SessionRecord {
            token: token.clone(),
            user_id: user.id,
            created_at,
            expires_at: OffsetDateTime::now_utc() - Duration::hours(1),
        });
        token
    }

    // ------------------------------------------------------------------
    // Assertion helpers
    // ------------------------------------------------------------------

    pub fn edge_count(&self) -> usize {
        self.lock().follows.len()
    }

    pub fn has_edge(&self, user: &UserRecord, author: &UserRecord) -> bool {
        self.lock()
            .follows
            .iter()
            .any(|edge| edge.user_id == user.id && edge.author_id == author.id)
    }

    pub fn comment_count(&self, post_id: Uuid) -> usize {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn post_body(&self, post_id: Uuid) -> Option<String> {
        self.lock()
            .posts
            .iter()
            .find(|post| post.id == post_id)
            .map(|post| post.body.clone())
    }

    pub fn post_group_slug(&self, post_id: Uuid) -> Option<String> {
        self.lock()
            .posts
            .iter()
            .find(|post| post.id == post_id)
            .and_then(|post| post.group.as_ref().map(|group| group.slug.clone()))
    }

    fn remove_post_with_cascade(inner: &mut StoreInner, id: Uuid) {
        inner.posts.retain(|post| post.id != id);
        inner.comments.retain(|comment| comment.post_id != id);
    }
}

fn sort_newest_first(posts: &mut [PostRecord]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn scope_matches(post: &PostRecord, scope: PostScope, follows: &[FollowRecord]) -> bool {
    match scope {
        PostScope::All => true,
        PostScope::Group(group_id) => post
            .group
            .as_ref()
            .is_some_and(|group| group.id == group_id),
        PostScope::Author(author_id) => post.author_id == author_id,
        PostScope::FollowedBy(viewer_id) => follows
            .iter()
            .any(|edge| edge.user_id == viewer_id && edge.author_id == post.author_id),
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock();
        if inner
            .users
            .iter()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let created_at = inner.next_timestamp();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            display_name: params.display_name,
            created_at,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock().users.iter().find(|user| user.id == id).cloned())
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut inner = self.lock();
        if inner.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let created_at = inner.next_timestamp();
        let group = GroupRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            description: params.description,
            created_at,
        };
        inner.groups.push(group.clone());
        Ok(group)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.lock().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.slug.cmp(&b.slug)));
        Ok(groups)
    }

    // Mirrors `posts.group_id ON DELETE SET NULL`: the posts survive
    // with their group reference cleared.
    async fn delete_group(&self, id: Uuid) -> Result<(), RepoError> {
        let mut inner = self.lock();
        inner.groups.retain(|group| group.id != id);
        for post in inner.posts.iter_mut() {
            if post.group.as_ref().is_some_and(|group| group.id == id) {
                post.group = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        scope: PostScope,
        bounds: PageBounds,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let inner = self.lock();
        let mut matching: Vec<PostRecord> = inner
            .posts
            .iter()
            .filter(|post| scope_matches(post, scope, &inner.follows))
            .cloned()
            .collect();
        sort_newest_first(&mut matching);

        Ok(matching
            .into_iter()
            .skip(bounds.offset as usize)
            .take(bounds.limit as usize)
            .collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let inner = self.lock();
        Ok(inner
            .posts
            .iter()
            .filter(|post| scope_matches(post, scope, &inner.follows))
            .count() as u64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.lock().posts.iter().find(|post| post.id == id).cloned())
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut inner = self.lock();
        let author_username = inner
            .users
            .iter()
            .find(|user| user.id == params.author_id)
            .map(|user| user.username.clone())
            .ok_or(RepoError::InvalidReference {
                message: "post author does not exist".to_string(),
            })?;
        let group = match params.group_id {
            Some(group_id) => Some(
                inner
                    .groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .map(|group| GroupRef {
                        id: group.id,
                        slug: group.slug.clone(),
                        title: group.title.clone(),
                    })
                    .ok_or(RepoError::InvalidReference {
                        message: "post group does not exist".to_string(),
                    })?,
            ),
            None => None,
        };

        let created_at = inner.next_timestamp();
        let post = PostRecord {
            id: Uuid::new_v4(),
            body: params.body,
            author_id: params.author_id,
            author_username,
            group,
            image_path: params.image_path,
            created_at,
        };
        inner.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut inner = self.lock();
        let group = match params.group_id {
            Some(group_id) => Some(
                inner
                    .groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .map(|group| GroupRef {
                        id: group.id,
                        slug: group.slug.clone(),
                        title: group.title.clone(),
                    })
                    .ok_or(RepoError::InvalidReference {
                        message: "post group does not exist".to_string(),
                    })?,
            ),
            None => None,
        };

        let post = inner
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.body = params.body;
        post.group = group;
        post.image_path = params.image_path;
        Ok(post.clone())
    }

    // Mirrors `comments.post_id ON DELETE CASCADE`.
    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut inner = self.lock();
        MemoryStore::remove_post_with_cascade(&mut inner, id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<CommentRecord> = self
            .lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut inner = self.lock();
        let author_username = inner
            .users
            .iter()
            .find(|user| user.id == params.author_id)
            .map(|user| user.username.clone())
            .ok_or(RepoError::InvalidReference {
                message: "comment author does not exist".to_string(),
            })?;
        let created_at = inner.next_timestamp();
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username,
            body: params.body,
            created_at,
        };
        inner.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    // Mirrors the follows table: primary key (user_id, author_id) and
    // CHECK (user_id <> author_id).
    async fn insert_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<(), RepoError> {
        let mut inner = self.lock();
        if user_id == author_id {
            return Err(RepoError::CheckViolation {
                constraint: "follows_no_self_follow".to_string(),
            });
        }
        if inner
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id)
        {
            return Err(RepoError::Duplicate {
                constraint: "follows_pkey".to_string(),
            });
        }
        let created_at = inner.next_timestamp();
        inner.follows.push(FollowRecord {
            user_id,
            author_id,
            created_at,
        });
        Ok(())
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut inner = self.lock();
        let before = inner.follows.len();
        inner
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(inner.follows.len() < before)
    }

    async fn follow_exists(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id))
    }

    async fn count_followers(&self, author_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .filter(|edge| edge.author_id == author_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .lock()
            .follows
            .iter()
            .filter(|edge| edge.user_id == user_id)
            .count() as u64)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let session = SessionRecord {
            token: params.token,
            user_id: params.user_id,
            created_at,
            expires_at: params.expires_at,
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_viewer(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<UserRecord>, RepoError> {
        let inner = self.lock();
        let Some(session) = inner
            .sessions
            .iter()
            .find(|session| session.token == token && session.expires_at > now)
        else {
            return Ok(None);
        };
        Ok(inner
            .users
            .iter()
            .find(|user| user.id == session.user_id)
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<(), RepoError> {
        self.lock().sessions.retain(|session| session.token != token);
        Ok(())
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Deterministic clock for cache expiry tests
// ----------------------------------------------------------------------

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().expect("clock lock") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock lock")
    }
}

// ----------------------------------------------------------------------
// Router plumbing
// ----------------------------------------------------------------------

pub const TEST_PAGE_SIZE: u64 = 5;

pub fn services(
    store: &MemoryStore,
    page_size: u64,
) -> (Arc<FeedService>, Arc<FollowService>, Arc<PostService>) {
    let repo = Arc::new(store.clone());
    let feed = Arc::new(FeedService::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        repo.clone(),
        repo.clone(),
        page_size,
    ));
    let follows = Arc::new(FollowService::new(repo.clone(), repo.clone()));
    let posts = Arc::new(PostService::new(repo.clone(), repo.clone(), repo));
    (feed, follows, posts)
}

pub fn http_state(store: &MemoryStore, cache: Option<CacheState>) -> HttpState {
    let (feed, follows, posts) = services(store, TEST_PAGE_SIZE);
    let repo = Arc::new(store.clone());
    let media_root = std::env::temp_dir().join(format!("verso-test-media-{}", Uuid::new_v4()));

    HttpState {
        feed,
        follows,
        posts,
        sessions: repo.clone(),
        media: Arc::new(MediaStorage::new(media_root).expect("media root created")),
        health: repo,
        cache,
        upload_limit_bytes: 1024 * 1024,
    }
}

pub fn router(store: &MemoryStore) -> Router {
    build_router(http_state(store, None))
}

pub fn cached_router(store: &MemoryStore, clock: ManualClock) -> (Router, Arc<PageCache>) {
    let cache_store = Arc::new(PageCache::new(&CacheConfig::default()));
    let cache = CacheState {
        store: cache_store.clone(),
        clock: Arc::new(clock),
        session_cookie: SESSION_COOKIE,
    };
    (build_router(http_state(store, Some(cache))), cache_store)
}

// ----------------------------------------------------------------------
// Request helpers
// ----------------------------------------------------------------------

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn get_with_session(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
        .body(Body::empty())
        .expect("request")
}

pub fn post_with_session(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
        .body(Body::empty())
        .expect("request")
}

pub fn post_anonymous(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn form_post(uri: &str, token: &str, form_body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body.to_string()))
        .expect("request")
}

pub fn multipart_post(uri: &str, token: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let boundary = "verso-test-boundary";
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request")
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collected")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
