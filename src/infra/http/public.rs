use std::io::ErrorKind;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Form, Multipart, Path, Query, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    application::{
        error::HttpError,
        feed::{FeedError, FeedService},
        follows::{FollowError, FollowService},
        pagination::PageParam,
        posts::{PostCommandError, PostInput, PostService},
        repos::{HealthRepo, SessionsRepo},
    },
    cache::{CacheState, page_cache_layer},
    domain::entities::UserRecord,
    infra::media::{MediaStorage, MediaStorageError},
    presentation::views::{
        FeedContext, FeedTemplate, GroupChoice, GroupContext, GroupTemplate, IndexContext,
        IndexTemplate, LayoutContext, PostCard, PostFormContext, PostFormTemplate,
        PostListContext, PostPageContext, PostTemplate, ProfileContext, ProfileTemplate,
        ViewerContext, render_not_found_response, render_template_response,
    },
};

use super::{
    auth::{Viewer, require_user},
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub follows: Arc<FollowService>,
    pub posts: Arc<PostService>,
    pub sessions: Arc<dyn SessionsRepo>,
    pub media: Arc<MediaStorage>,
    pub health: Arc<dyn HealthRepo>,
    pub cache: Option<CacheState>,
    pub upload_limit_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the global index goes through the page cache; every other
    // view reads straight through to storage.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            page_cache_layer,
        ))
    } else {
        cached_routes
    };

    let upload_limit = DefaultBodyLimit::max(state.upload_limit_bytes);
    let uncached_routes = Router::new()
        .route("/feed", get(following_feed))
        .route("/groups/{slug}", get(group_posts))
        .route("/profiles/{username}", get(profile))
        .route("/profiles/{username}/follow", post(follow_author))
        .route("/profiles/{username}/unfollow", post(unfollow_author))
        .route(
            "/posts/new",
            get(new_post_form)
                .post(create_post)
                .layer(upload_limit.clone()),
        )
        .route("/posts/{id}", get(post_detail))
        .route(
            "/posts/{id}/edit",
            get(edit_post_form).post(update_post).layer(upload_limit),
        )
        .route("/posts/{id}/comments", post(add_comment))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(db_health));

    cached_routes
        .merge(uncached_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

fn viewer_context(viewer: &Viewer) -> ViewerContext {
    ViewerContext {
        username: viewer.user().map(|user| user.username.clone()),
    }
}

fn user_context(user: &UserRecord) -> ViewerContext {
    ViewerContext {
        username: Some(user.username.clone()),
    }
}

async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(param): Query<PageParam>,
) -> Response {
    let chrome = viewer_context(&viewer);
    match state.feed.index(param.requested()).await {
        Ok(page) => {
            let content = IndexContext {
                listing: PostListContext::from_page(&page, "/"),
            };
            render_template_response(
                IndexTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response("infra::http::public::index", err, chrome),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(param): Query<PageParam>,
) -> Response {
    let chrome = viewer_context(&viewer);
    match state.feed.group_posts(&slug, param.requested()).await {
        Ok(page) => {
            let content = GroupContext {
                title: page.group.title,
                description: page.group.description,
                listing: PostListContext::from_page(&page.posts, &format!("/groups/{slug}")),
            };
            render_template_response(
                GroupTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response("infra::http::public::group_posts", err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    Query(param): Query<PageParam>,
) -> Response {
    let chrome = viewer_context(&viewer);
    match state
        .feed
        .profile(&username, viewer.user(), param.requested())
        .await
    {
        Ok(page) => {
            let is_self = viewer
                .user()
                .is_some_and(|user| user.id == page.author.id);
            let content = ProfileContext {
                username: page.author.username.clone(),
                label: page.author.label().to_string(),
                is_self,
                viewer_is_following: page.viewer_is_following,
                follower_count: page.follower_count,
                following_count: page.following_count,
                listing: PostListContext::from_page(
                    &page.posts,
                    &format!("/profiles/{username}"),
                ),
            };
            render_template_response(
                ProfileTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response("infra::http::public::profile", err, chrome),
    }
}

async fn following_feed(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(param): Query<PageParam>,
) -> Response {
    let user = match require_user(viewer, "/feed") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let chrome = user_context(&user);
    match state.feed.following_feed(&user, param.requested()).await {
        Ok(page) => {
            let content = FeedContext {
                listing: PostListContext::from_page(&page, "/feed"),
            };
            render_template_response(
                FeedTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response("infra::http::public::following_feed", err, chrome),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Response {
    let chrome = viewer_context(&viewer);
    match state.feed.post_detail(id).await {
        Ok(detail) => {
            let can_edit = viewer
                .user()
                .is_some_and(|user| user.id == detail.post.author_id);
            let content = PostPageContext {
                post: PostCard::from_record(&detail.post),
                can_edit,
                can_comment: viewer.user().is_some(),
                author_post_count: detail.author_post_count,
                comments: detail
                    .comments
                    .iter()
                    .map(crate::presentation::views::CommentView::from_record)
                    .collect(),
            };
            render_template_response(
                PostTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response("infra::http::public::post_detail", err, chrome),
    }
}

/// Create the follow edge, then redirect back to the profile.
///
/// Self-follow and duplicate attempts are swallowed on purpose: the
/// public action never errors visibly for them, the viewer just lands
/// back on the profile. The cause still reaches the logs.
async fn follow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match require_user(viewer, &format!("/profiles/{username}/follow")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let profile_href = format!("/profiles/{username}");
    match state.follows.follow(&user, &username).await {
        Ok(_) => Redirect::to(&profile_href).into_response(),
        Err(FollowError::SelfFollow) => {
            debug!(
                target: "verso::http::follow",
                follower = %user.username,
                author = %username,
                cause = "self_follow",
                "follow attempt swallowed"
            );
            Redirect::to(&profile_href).into_response()
        }
        Err(FollowError::AlreadyFollowing) => {
            debug!(
                target: "verso::http::follow",
                follower = %user.username,
                author = %username,
                cause = "duplicate",
                "follow attempt swallowed"
            );
            Redirect::to(&profile_href).into_response()
        }
        Err(FollowError::UnknownAuthor) => render_not_found_response(user_context(&user)),
        Err(FollowError::Repo(err)) => {
            HttpError::internal("infra::http::public::follow_author", &err).into_response()
        }
    }
}

async fn unfollow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match require_user(viewer, &format!("/profiles/{username}/unfollow")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.unfollow(&user, &username).await {
        // Removing an absent edge lands here too; both outcomes look
        // identical from the profile page.
        Ok(_) | Err(FollowError::SelfFollow) | Err(FollowError::AlreadyFollowing) => {
            Redirect::to(&format!("/profiles/{username}")).into_response()
        }
        Err(FollowError::UnknownAuthor) => render_not_found_response(user_context(&user)),
        Err(FollowError::Repo(err)) => {
            HttpError::internal("infra::http::public::unfollow_author", &err).into_response()
        }
    }
}

async fn new_post_form(State(state): State<HttpState>, viewer: Viewer) -> Response {
    let user = match require_user(viewer, "/posts/new") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let groups = match state.posts.group_choices().await {
        Ok(groups) => groups,
        Err(err) => {
            return HttpError::internal("infra::http::public::new_post_form", &err)
                .into_response();
        }
    };

    let content = PostFormContext {
        heading: "New post".to_string(),
        action_href: "/posts/new".to_string(),
        body: String::new(),
        groups: group_choices(groups, None),
        is_edit: false,
    };
    render_template_response(
        PostFormTemplate {
            view: LayoutContext::new(user_context(&user), content),
        },
        StatusCode::OK,
    )
}

async fn create_post(
    State(state): State<HttpState>,
    viewer: Viewer,
    multipart: Multipart,
) -> Response {
    let user = match require_user(viewer, "/posts/new") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let input = match read_post_input(multipart, &state.media).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.create_post(&user, input).await {
        Ok(_) => Redirect::to(&format!("/profiles/{}", user.username)).into_response(),
        Err(err) => {
            post_command_error_to_response("infra::http::public::create_post", err, &user)
        }
    }
}

async fn edit_post_form(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Response {
    let user = match require_user(viewer, &format!("/posts/{id}/edit")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let post = match state.posts.find_post(id).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(user_context(&user)),
        Err(err) => {
            return HttpError::internal("infra::http::public::edit_post_form", &err)
                .into_response();
        }
    };

    // A non-author lands on the detail page with nothing changed.
    if post.author_id != user.id {
        return Redirect::to(&format!("/posts/{id}")).into_response();
    }

    let groups = match state.posts.group_choices().await {
        Ok(groups) => groups,
        Err(err) => {
            return HttpError::internal("infra::http::public::edit_post_form", &err)
                .into_response();
        }
    };

    let selected = post.group.as_ref().map(|group| group.slug.clone());
    let content = PostFormContext {
        heading: "Edit post".to_string(),
        action_href: format!("/posts/{id}/edit"),
        body: post.body,
        groups: group_choices(groups, selected.as_deref()),
        is_edit: true,
    };
    render_template_response(
        PostFormTemplate {
            view: LayoutContext::new(user_context(&user), content),
        },
        StatusCode::OK,
    )
}

async fn update_post(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Response {
    let user = match require_user(viewer, &format!("/posts/{id}/edit")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let input = match read_post_input(multipart, &state.media).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.update_post(&user, id, input).await {
        Ok(post) => Redirect::to(&format!("/posts/{}", post.id)).into_response(),
        // Same bounce as the edit form: the post stays untouched.
        Err(PostCommandError::NotAuthor) => {
            Redirect::to(&format!("/posts/{id}")).into_response()
        }
        Err(err) => {
            post_command_error_to_response("infra::http::public::update_post", err, &user)
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    #[serde(default)]
    body: String,
}

async fn add_comment(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
    Form(form): Form<CommentForm>,
) -> Response {
    let user = match require_user(viewer, &format!("/posts/{id}")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let detail_href = format!("/posts/{id}");
    match state.posts.add_comment(&user, id, &form.body).await {
        // An empty comment is dropped silently; the viewer just lands
        // back on the post.
        Ok(_) | Err(PostCommandError::EmptyComment) => {
            Redirect::to(&detail_href).into_response()
        }
        Err(PostCommandError::UnknownPost) => render_not_found_response(user_context(&user)),
        Err(err) => {
            HttpError::internal("infra::http::public::add_comment", &err).into_response()
        }
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(MediaStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(MediaStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored image"
            );
            HttpError::internal(SOURCE, &err).into_response()
        }
    }
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

fn group_choices(
    groups: Vec<crate::domain::entities::GroupRecord>,
    selected: Option<&str>,
) -> Vec<GroupChoice> {
    groups
        .into_iter()
        .map(|group| GroupChoice {
            selected: selected == Some(group.slug.as_str()),
            slug: group.slug,
            title: group.title,
        })
        .collect()
}

/// Pull the post form out of a multipart request, storing an uploaded
/// image along the way.
async fn read_post_input(
    mut multipart: Multipart,
    media: &MediaStorage,
) -> Result<PostInput, HttpError> {
    const SOURCE: &str = "infra::http::public::read_post_input";

    let mut input = PostInput::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(HttpError::new(
                    SOURCE,
                    StatusCode::BAD_REQUEST,
                    "Malformed form submission",
                    err.to_string(),
                ));
            }
        };

        match field.name() {
            Some("body") => {
                input.body = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form submission",
                        err.to_string(),
                    )
                })?;
            }
            Some("group") => {
                let value = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form submission",
                        err.to_string(),
                    )
                })?;
                input.group_slug = (!value.trim().is_empty()).then_some(value);
            }
            Some("image") => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let payload: Bytes = field.bytes().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Image upload failed",
                        err.to_string(),
                    )
                })?;
                // The file input is optional; browsers submit an empty
                // part when nothing was picked.
                if original_name.is_empty() || payload.is_empty() {
                    continue;
                }
                let stored = media.store(&original_name, payload).await.map_err(|err| {
                    HttpError::from_error(
                        SOURCE,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Image upload failed",
                        &err,
                    )
                })?;
                input.image_path = Some(stored);
            }
            _ => {}
        }
    }

    Ok(input)
}

fn post_command_error_to_response(
    source: &'static str,
    err: PostCommandError,
    user: &UserRecord,
) -> Response {
    match err {
        PostCommandError::EmptyBody => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Post text is required",
            "submitted post body was empty",
        )
        .into_response(),
        PostCommandError::UnknownGroup => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Unknown group",
            "submitted group slug does not exist",
        )
        .into_response(),
        PostCommandError::UnknownPost => render_not_found_response(user_context(user)),
        err => HttpError::internal(source, &err).into_response(),
    }
}

fn feed_error_to_response(
    source: &'static str,
    err: FeedError,
    chrome: ViewerContext,
) -> Response {
    match err {
        FeedError::NotFound => render_not_found_response(chrome),
        FeedError::Repo(err) => HttpError::internal(source, &err).into_response(),
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    use axum::http::HeaderValue;

    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
