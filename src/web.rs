use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::annotate::{Annotator, Marker};
use crate::card::Card;
use crate::detail::{DetailPage, NOT_FOUND_MEMO, NOT_FOUND_TITLE};
use crate::dom::{self, DomNode, Element};
use crate::glossary::{Glossary, NewsLink, TermRef};
use crate::matcher::build_matchers;
use crate::search::SearchSession;

type SharedState = Arc<AppState>;

/// Id of the injected style block, also the idempotence check.
const STYLE_ID: &str = "glossmark-style";

const PAGE_STYLE: &str = "\
.gloss-term { border-bottom: 1px dotted #1a6; cursor: pointer; }\n\
.gloss-term:hover { background: #eefaf3; }\n\
.explain-card { position: absolute; z-index: 50; max-width: 320px; padding: 12px; \
background: #fff; border: 1px solid #cdd; border-radius: 8px; \
box-shadow: 0 4px 14px rgba(0, 0, 0, 0.12); }\n\
.explain-title { font-weight: 700; margin-bottom: 4px; }\n\
.explain-memo { font-size: 13px; color: #333; margin-bottom: 8px; }\n\
.tip-news-head { font-size: 12px; color: #567; margin-bottom: 2px; }\n\
.explain-news { margin: 0 0 8px; padding-left: 18px; font-size: 13px; }\n\
.explain-more { font-size: 13px; }\n\
mark.hl { background: #fde68a; }\n\
mark.hl.current { background: #f59e0b; }\n";

const DETAIL_STYLE: &str = "\
body { font-family: sans-serif; margin: 0; }\n\
.term-detail { max-width: 720px; margin: 0 auto; padding: 24px 16px; }\n\
#memo { color: #333; }\n\
#who { color: #567; }\n\
#topics, #news { padding-left: 18px; }\n";

/// Server-side state: the dictionary, the annotated article rendering
/// served as-is, and the pristine article root each search request
/// starts from.
pub struct AppState {
    pub glossary: Glossary,
    pristine_article: Element,
    page_html: String,
    markers: Vec<Marker>,
}

impl AppState {
    /// Annotates `article_html` once at startup. The styled, annotated
    /// document is frozen into `page_html`; an unannotated copy of the
    /// article root is kept for search.
    pub fn build(glossary: Glossary, article_html: &str) -> Self {
        let mut document = dom::parse(article_html);
        let pristine_article = dom::article_root(&mut document).clone();
        let annotator = Annotator::new(build_matchers(&glossary));
        let markers = annotator.annotate(dom::article_root(&mut document));
        inject_style(&mut document);
        let page_html = dom::to_document_html(&document);
        Self {
            glossary,
            pristine_article,
            page_html,
            markers,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

fn inject_style(document: &mut Element) {
    if document.find_by_id(STYLE_ID).is_some() {
        return;
    }
    let mut style = Element::new("style");
    style.set_attr("id", STYLE_ID);
    style.children.push(DomNode::text(PAGE_STYLE));
    match document.find_by_tag_mut("head") {
        Some(head) => head.children.push(DomNode::Element(style)),
        None => document.children.insert(0, DomNode::Element(style)),
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

/// Installs the process-wide tracing subscriber. `RUST_LOG` overrides
/// the default `info` filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn serve(
    config: WebConfig,
    glossary: Glossary,
    article_html: &str,
) -> Result<(), WebError> {
    let state = Arc::new(AppState::build(glossary, article_html));
    info!(
        %config.addr,
        terms = state.glossary.len(),
        markers = state.markers.len(),
        "Binding HTTP listener"
    );
    let router = build_router(state);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(article_page))
        .route("/term", get(term_html))
        .route("/card", get(card_fragment))
        .route("/api/term", get(api_term))
        .route("/api/search", get(api_search))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn article_page(State(state): State<SharedState>) -> impl IntoResponse {
    Html(state.page_html.clone())
}

#[derive(Debug, Deserialize)]
struct TermParams {
    #[serde(default)]
    q: String,
}

async fn term_html(
    State(state): State<SharedState>,
    Query(params): Query<TermParams>,
) -> impl IntoResponse {
    let page = DetailPage::resolve(&state.glossary, &params.q);
    let rendered = match &page {
        DetailPage::NotFound => DetailTemplate {
            style: DETAIL_STYLE,
            found: false,
            title: NOT_FOUND_TITLE,
            memo: NOT_FOUND_MEMO,
            who_line: "",
            topics: &[],
            news: &[],
        }
        .render(),
        DetailPage::Found {
            title,
            memo,
            who_line,
            topics,
            news,
        } => DetailTemplate {
            style: DETAIL_STYLE,
            found: true,
            title: title.as_str(),
            memo: memo.as_str(),
            who_line: who_line.as_str(),
            topics: topics.as_slice(),
            news: &news[..],
        }
        .render(),
    };
    Html(rendered.unwrap_or_else(|err| render_error_page(&err.to_string())))
}

#[derive(Debug, Deserialize)]
struct CardParams {
    #[serde(default)]
    key: String,
}

async fn card_fragment(
    State(state): State<SharedState>,
    Query(params): Query<CardParams>,
) -> Result<Html<String>, ApiError> {
    let key = params.key.trim();
    if key.is_empty() {
        return Err(ApiError::bad_request("Query parameter `key` is required"));
    }
    let card = Card::build(&state.glossary, key)
        .ok_or_else(|| ApiError::not_found(format!("no glossary entry for {key:?}")))?;
    Ok(Html(card.to_html()))
}

#[derive(Debug, Serialize, Deserialize)]
struct TermPayload {
    key: String,
    title: String,
    memo: Option<String>,
    who: Option<String>,
    topics: Vec<String>,
    pattern: Option<String>,
    news: Vec<NewsLink>,
}

impl TermPayload {
    fn from_term(term: TermRef<'_>) -> Self {
        Self {
            key: term.key().to_string(),
            title: term.title().to_string(),
            memo: term.memo().map(str::to_string),
            who: term.who().map(str::to_string),
            topics: term.topics().to_vec(),
            pattern: term.pattern_source().map(str::to_string),
            news: term.news().to_vec(),
        }
    }
}

async fn api_term(
    State(state): State<SharedState>,
    Query(params): Query<TermParams>,
) -> Result<Json<TermPayload>, ApiError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query parameter `q` is required"));
    }
    let term = state
        .glossary
        .resolve(query)
        .ok_or_else(|| ApiError::not_found(format!("no glossary entry for {query:?}")))?;
    Ok(Json(TermPayload::from_term(term)))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    cursor: Option<isize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResponsePayload {
    query: String,
    hits: usize,
    cursor: Option<usize>,
    status: String,
    html: String,
}

/// Stateless search: every request replays the query against a fresh
/// copy of the pristine article, so concurrent searchers never see each
/// other's highlights.
async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponsePayload> {
    let mut session = SearchSession::new(state.pristine_article.clone());
    session.set_query(&params.q);
    if let Some(cursor) = params.cursor {
        session.focus(cursor);
    }
    Json(SearchResponsePayload {
        query: session.query().to_string(),
        hits: session.hit_count(),
        cursor: session.cursor(),
        status: session.status(),
        html: session.html(),
    })
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "terms": state.glossary.len(),
        "markers": state.markers.len(),
    }))
}

fn render_error_page(message: &str) -> String {
    ErrorTemplate { message }
        .render()
        .unwrap_or_else(|_| message.to_string())
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="ja">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>用語解説 • {{ title }}</title>
    <style>{{ style|safe }}</style>
  </head>
  <body>
    <main class="term-detail">
      <h1 id="title">{{ title }}</h1>
      <p id="memo">{{ memo }}</p>
      {% if found %}
      <p id="who">{{ who_line }}</p>
      <ul id="topics">
        {% for topic in topics %}
        <li>{{ topic }}</li>
        {% endfor %}
      </ul>
      <h2>最近のニュース</h2>
      <ul id="news">
        {% for link in news %}
        <li><a href="{{ link.url }}" target="_blank" rel="noopener">{% if link.title.len() > 0 %}{{ link.title }}{% else %}{{ link.url }}{% endif %}</a></li>
        {% endfor %}
      </ul>
      {% endif %}
      <p><a href="/">記事へ戻る</a></p>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct DetailTemplate<'a> {
    style: &'a str,
    found: bool,
    title: &'a str,
    memo: &'a str,
    who_line: &'a str,
    topics: &'a [String],
    news: &'a [NewsLink],
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="ja">
  <head>
    <meta charset="utf-8" />
    <title>エラー</title>
  </head>
  <body>
    <main>
      <h1>表示できませんでした</h1>
      <p>{{ message }}</p>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct ErrorTemplate<'a> {
    message: &'a str,
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::glossary::sample_glossary;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    const ARTICLE: &str = "<html><head><title>経済ニュース</title></head><body>\
        <div id=\"article\"><h1>物価の動向</h1>\
        <p>今月も物価の上昇が続いた。<a href=\"/about\">編集部より</a></p></div>\
        </body></html>";

    fn test_router() -> Router {
        let state = Arc::new(AppState::build(sample_glossary(), ARTICLE));
        build_router(state)
    }

    async fn get_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn article_page_is_annotated_and_styled() {
        let (status, html) = get_text(test_router(), "/").await;
        assert!(status.is_success());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<style id=\"glossmark-style\">"));
        assert!(html.contains("<span class=\"gloss-term\" data-key=\"物価\">物価</span>"));
        assert!(html.contains("<a href=\"/about\">編集部より</a>"));
    }

    #[tokio::test]
    async fn detail_page_renders_every_region() {
        let (status, html) = get_text(test_router(), "/term?q=%E7%89%A9%E4%BE%A1").await;
        assert!(status.is_success());
        assert!(html.contains("<h1 id=\"title\">物価</h1>"));
        assert!(html.contains("モノやサービスの値段の全体的な水準。"));
        assert!(html.contains("担当・所管：総務省統計局"));
        assert!(html.contains("<li>経済</li>"));
        assert!(html.contains("最近のニュース"));
        assert!(html.contains("Googleニュースで「物価」"));
    }

    #[tokio::test]
    async fn detail_page_not_found_shows_fixed_strings() {
        let (status, html) =
            get_text(test_router(), "/term?q=%E3%81%AA%E3%81%84%E8%AA%9E").await;
        assert!(status.is_success());
        assert!(html.contains("用語情報が見つかりません"));
        assert!(html.contains("用語辞書に追加してください。"));
        assert!(!html.contains("id=\"who\""));
    }

    #[tokio::test]
    async fn card_fragment_links_to_the_detail_path() {
        let (status, html) = get_text(test_router(), "/card?key=%E5%86%86%E5%AE%89").await;
        assert!(status.is_success());
        assert!(html.starts_with("<div class=\"explain-card\">"));
        assert!(html.contains("href=\"/term?q=%E5%86%86%E5%AE%89\""));
    }

    #[tokio::test]
    async fn unknown_card_key_is_a_json_404() {
        let (status, body) = get_text(test_router(), "/card?key=%E6%9C%AA%E7%9F%A5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("未知"));
    }

    #[tokio::test]
    async fn api_term_round_trips_the_entry() {
        let (status, body) =
            get_text(test_router(), "/api/term?q=%E3%82%A4%E3%83%B3%E3%83%95%E3%83%AC").await;
        assert!(status.is_success());
        let payload: TermPayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.key, "物価");
        assert_eq!(payload.title, "物価");
        assert_eq!(payload.who.as_deref(), Some("総務省統計局"));
        assert_eq!(payload.news.len(), 3);
    }

    #[tokio::test]
    async fn api_term_without_query_is_a_400() {
        let (status, _) = get_text(test_router(), "/api/term").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_search_reports_hits_and_status() {
        let (status, body) =
            get_text(test_router(), "/api/search?q=%E7%89%A9%E4%BE%A1").await;
        assert!(status.is_success());
        let payload: SearchResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.hits, 2);
        assert_eq!(payload.cursor, Some(0));
        assert_eq!(payload.status, "1 / 2");
        assert!(payload.html.contains("<mark class=\"hl current\">物価</mark>"));
        // The served search tree is never the annotated one.
        assert!(!payload.html.contains("gloss-term"));
    }

    #[tokio::test]
    async fn api_search_cursor_wraps() {
        let (status, body) =
            get_text(test_router(), "/api/search?q=%E7%89%A9%E4%BE%A1&cursor=2").await;
        assert!(status.is_success());
        let payload: SearchResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.cursor, Some(0));
        assert_eq!(payload.status, "1 / 2");
    }

    #[tokio::test]
    async fn healthz_reports_counts() {
        let (status, body) = get_text(test_router(), "/healthz").await;
        assert!(status.is_success());
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["terms"], 5);
        assert_eq!(payload["markers"], 2);
    }
}
