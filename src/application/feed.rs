//! Read-side assembly: listings, profiles, the personal feed, and post
//! detail pages.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, resolve_page};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    follows: Arc<dyn FollowsRepo>,
    page_size: u64,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("requested resource does not exist")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct GroupPage {
    pub group: GroupRecord,
    pub posts: Page<PostRecord>,
}

pub struct ProfilePage {
    pub author: UserRecord,
    pub posts: Page<PostRecord>,
    /// Whether the viewer currently follows this author. Always false
    /// for anonymous viewers and for an author looking at themselves.
    pub viewer_is_following: bool,
    pub follower_count: u64,
    pub following_count: u64,
}

pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: u64,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            comments,
            follows,
            page_size,
        }
    }

    /// The global listing: every post, newest first.
    pub async fn index(&self, requested_page: i64) -> Result<Page<PostRecord>, FeedError> {
        self.page(PostScope::All, requested_page).await
    }

    pub async fn group_posts(
        &self,
        slug: &str,
        requested_page: i64,
    ) -> Result<GroupPage, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::NotFound)?;
        let posts = self.page(PostScope::Group(group.id), requested_page).await?;
        Ok(GroupPage { group, posts })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested_page: i64,
    ) -> Result<ProfilePage, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::NotFound)?;
        let posts = self
            .page(PostScope::Author(author.id), requested_page)
            .await?;

        let viewer_is_following = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follows.follow_exists(viewer.id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfilePage {
            viewer_is_following,
            follower_count: self.follows.count_followers(author.id).await?,
            following_count: self.follows.count_following(author.id).await?,
            author,
            posts,
        })
    }

    /// Posts authored by everyone the viewer follows, newest first.
    ///
    /// This path is never cached: a post is included exactly when a live
    /// follow edge to its author exists at query time, so follow and
    /// unfollow actions are visible on the very next request.
    pub async fn following_feed(
        &self,
        viewer: &UserRecord,
        requested_page: i64,
    ) -> Result<Page<PostRecord>, FeedError> {
        self.page(PostScope::FollowedBy(viewer.id), requested_page)
            .await
    }

    pub async fn post_detail(&self, id: Uuid) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(FeedError::NotFound)?;
        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(post.author_id))
            .await?;
        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    /// Count, clamp, then fetch, so an out-of-range request runs the
    /// last page's query instead of returning an empty page.
    async fn page(
        &self,
        scope: PostScope,
        requested: i64,
    ) -> Result<Page<PostRecord>, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let bounds = resolve_page(total, self.page_size, requested);
        let items = self.posts.list_posts(scope, bounds).await?;
        Ok(Page::new(items, bounds))
    }
}
