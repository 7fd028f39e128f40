//! The relation guard: creation and removal of follow edges.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

/// Failure causes for follow actions.
///
/// `SelfFollow` and `AlreadyFollowing` are distinct variants even though
/// the public endpoint answers both with the same silent redirect: the
/// cause stays observable in logs and tests instead of collapsing into
/// one swallowed exception.
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("a user cannot follow themselves")]
    SelfFollow,
    #[error("follow edge already exists")]
    AlreadyFollowing,
    #[error("author does not exist")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for FollowError {
    fn from(err: RepoError) -> Self {
        match err {
            // The follows table owns both guards: its primary key makes
            // the edge unique, its check constraint forbids user == author.
            RepoError::Duplicate { .. } => FollowError::AlreadyFollowing,
            RepoError::CheckViolation { .. } => FollowError::SelfFollow,
            other => FollowError::Repo(other),
        }
    }
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    /// Create the edge follower -> author.
    ///
    /// The self-follow comparison here is a fast path; the storage
    /// constraint is authoritative and catches racing requests, so a
    /// concurrent duplicate insert still comes back as
    /// `AlreadyFollowing` rather than a second edge.
    pub async fn follow(
        &self,
        follower: &UserRecord,
        author_username: &str,
    ) -> Result<UserRecord, FollowError> {
        let author = self.lookup_author(author_username).await?;
        if author.id == follower.id {
            return Err(FollowError::SelfFollow);
        }

        self.follows.insert_follow(follower.id, author.id).await?;
        debug!(
            target: "verso::follows",
            follower = %follower.username,
            author = %author.username,
            "follow edge created"
        );
        Ok(author)
    }

    /// Remove the edge follower -> author. Removing an absent edge is
    /// not an error.
    pub async fn unfollow(
        &self,
        follower: &UserRecord,
        author_username: &str,
    ) -> Result<UserRecord, FollowError> {
        let author = self.lookup_author(author_username).await?;
        let removed = self
            .follows
            .delete_follow(follower.id, author.id)
            .await
            .map_err(FollowError::Repo)?;
        if removed {
            debug!(
                target: "verso::follows",
                follower = %follower.username,
                author = %author.username,
                "follow edge removed"
            );
        }
        Ok(author)
    }

    async fn lookup_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await
            .map_err(FollowError::Repo)?
            .ok_or(FollowError::UnknownAuthor)
    }
}
