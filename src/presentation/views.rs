use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use uuid::Uuid;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, PostRecord};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    source_location: &'static str,
    public_message: &'static str,
    #[source]
    error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source_location: &'static str, error: AskamaError) -> Self {
        Self {
            source_location,
            public_message: "Template rendering failed",
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        HttpError::from_error(
            err.source_location,
            StatusCode::INTERNAL_SERVER_ERROR,
            err.public_message,
            &err.error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new("presentation::views::render_template", err).into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: ViewerContext) -> Response {
    let view = LayoutContext::new(viewer, ErrorPageContext::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Login state shown in the chrome of every page.
#[derive(Clone, Default)]
pub struct ViewerContext {
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub viewer: ViewerContext,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(viewer: ViewerContext, content: T) -> Self {
        Self { viewer, content }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub slug: String,
    pub title: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: Uuid,
    pub author_username: String,
    pub group: Option<GroupBadge>,
    pub published: String,
    pub body: String,
    pub image_href: Option<String>,
}

impl PostCard {
    pub fn from_record(record: &PostRecord) -> Self {
        Self {
            id: record.id,
            author_username: record.author_username.clone(),
            group: record.group.as_ref().map(|group| GroupBadge {
                slug: group.slug.clone(),
                title: group.title.clone(),
            }),
            published: format_published(record.created_at),
            body: record.body.clone(),
            image_href: record
                .image_path
                .as_ref()
                .map(|path| format!("/media/{path}")),
        }
    }
}

#[derive(Clone)]
pub struct CommentView {
    pub author_username: String,
    pub published: String,
    pub body: String,
}

impl CommentView {
    pub fn from_record(record: &CommentRecord) -> Self {
        Self {
            author_username: record.author_username.clone(),
            published: format_published(record.created_at),
            body: record.body.clone(),
        }
    }
}

/// Numbered pager controls below every listing.
#[derive(Clone)]
pub struct PagerView {
    pub number: u64,
    pub total_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_href: String,
    pub next_href: String,
}

impl PagerView {
    pub fn for_page<T>(page: &Page<T>, base_path: &str) -> Self {
        Self {
            number: page.number,
            total_pages: page.total_pages,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            previous_href: format!("{base_path}?page={}", page.number.saturating_sub(1).max(1)),
            next_href: format!("{base_path}?page={}", page.number + 1),
        }
    }
}

/// Shared listing body: cards plus pager.
#[derive(Clone)]
pub struct PostListContext {
    pub posts: Vec<PostCard>,
    pub pager: PagerView,
    pub total_count: u64,
}

impl PostListContext {
    pub fn from_page(page: &Page<PostRecord>, base_path: &str) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from_record).collect(),
            pager: PagerView::for_page(page, base_path),
            total_count: page.total_count,
        }
    }
}

pub struct IndexContext {
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexContext>,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub label: String,
    pub is_self: bool,
    pub viewer_is_following: bool,
    pub follower_count: u64,
    pub following_count: u64,
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

pub struct FeedContext {
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "feed.html")]
pub struct FeedTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct PostPageContext {
    pub post: PostCard,
    pub can_edit: bool,
    pub can_comment: bool,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostPageContext>,
}

#[derive(Clone)]
pub struct GroupChoice {
    pub slug: String,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub heading: String,
    pub action_href: String,
    pub body: String,
    pub groups: Vec<GroupChoice>,
    pub is_edit: bool,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct ErrorPageContext {
    pub title: String,
    pub message: String,
}

impl ErrorPageContext {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist. Head back to the index to keep reading.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageContext>,
}

const PUBLISHED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day padding:none] [month repr:short] [year]");

pub fn format_published(at: OffsetDateTime) -> String {
    at.format(&PUBLISHED_FORMAT)
        .unwrap_or_else(|_| at.date().to_string())
}
