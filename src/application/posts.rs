//! Write-side commands for posts and comments.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

#[derive(Debug, Error)]
pub enum PostCommandError {
    #[error("post body must not be empty")]
    EmptyBody,
    #[error("comment body must not be empty")]
    EmptyComment,
    #[error("group does not exist")]
    UnknownGroup,
    #[error("post does not exist")]
    UnknownPost,
    #[error("only the author may edit a post")]
    NotAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Form input for creating or editing a post.
#[derive(Debug, Default, Clone)]
pub struct PostInput {
    pub body: String,
    /// Empty or missing means "no group".
    pub group_slug: Option<String>,
    /// Stored media path of a freshly uploaded image, if any.
    pub image_path: Option<String>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            comments,
        }
    }

    pub async fn create_post(
        &self,
        author: &UserRecord,
        input: PostInput,
    ) -> Result<PostRecord, PostCommandError> {
        let body = normalized_body(&input.body).ok_or(PostCommandError::EmptyBody)?;
        let group_id = self.resolve_group(input.group_slug.as_deref()).await?;

        let record = self
            .posts
            .create_post(CreatePostParams {
                body,
                author_id: author.id,
                group_id,
                image_path: input.image_path,
            })
            .await?;

        info!(
            target: "verso::posts",
            post = %record.id,
            author = %author.username,
            "post created"
        );
        Ok(record)
    }

    /// Edit body, group, and image. Authorship and creation time never
    /// change; an editor other than the author is rejected before any
    /// write happens.
    pub async fn update_post(
        &self,
        editor: &UserRecord,
        post_id: Uuid,
        input: PostInput,
    ) -> Result<PostRecord, PostCommandError> {
        let existing = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostCommandError::UnknownPost)?;
        if existing.author_id != editor.id {
            return Err(PostCommandError::NotAuthor);
        }

        let body = normalized_body(&input.body).ok_or(PostCommandError::EmptyBody)?;
        let group_id = self.resolve_group(input.group_slug.as_deref()).await?;
        let image_path = input.image_path.or(existing.image_path);

        self.posts
            .update_post(UpdatePostParams {
                id: post_id,
                body,
                group_id,
                image_path,
            })
            .await
            .map_err(Into::into)
    }

    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: Uuid,
        body: &str,
    ) -> Result<CommentRecord, PostCommandError> {
        let body = normalized_body(body).ok_or(PostCommandError::EmptyComment)?;
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostCommandError::UnknownPost)?;

        self.comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                body,
            })
            .await
            .map_err(Into::into)
    }

    /// All groups, for the group selector on the post form.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostCommandError> {
        self.groups.list_groups().await.map_err(Into::into)
    }

    /// Fetch a post for the edit form.
    pub async fn find_post(&self, post_id: Uuid) -> Result<Option<PostRecord>, PostCommandError> {
        self.posts.find_by_id(post_id).await.map_err(Into::into)
    }

    async fn resolve_group(&self, slug: Option<&str>) -> Result<Option<Uuid>, PostCommandError> {
        let Some(slug) = slug.map(str::trim).filter(|slug| !slug.is_empty()) else {
            return Ok(None);
        };
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(PostCommandError::UnknownGroup)?;
        Ok(Some(group.id))
    }
}

fn normalized_body(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
