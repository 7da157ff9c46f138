//! avsox catalog adapter.
//!
//! avsox has no direct detail URL per identifier, so lookups go through its
//! search page: each spelling from the candidate list is searched until one
//! returns a small set of movie links, then the first link is fetched and
//! decoded.

use scraper::Html;

use super::registry::PluginArgs;
use super::{BoxFuture, HttpInvoker, Plugin, PluginContext, PluginError, get_request};
use crate::decoder::{DecodeError, DecodeOptions, XPathHtmlDecoder, decode_list};
use crate::model::AvMeta;
use crate::number::Number;

pub const AVSOX: &str = "avsox";

const DEFAULT_BASE_URL: &str = "https://avsox.click";
const SEARCH_LINK_EXPR: &str = r#"//*[@id="waterfall"]/div/a/@href"#;
/// More matches than this means the query was too broad to trust.
const MAX_SEARCH_LINKS: usize = 5;

fn detail_rules() -> XPathHtmlDecoder {
    XPathHtmlDecoder {
        number_expr: r#"//span[contains(text(),"识别码:")]/../span[2]/text()"#.into(),
        title_expr: "/html/body/div[2]/h3/text()".into(),
        actor_list_expr: r#"//a[@class="avatar-box"]/span/text()"#.into(),
        release_date_expr: r#"//span[contains(text(),"发行时间:")]/../text()"#.into(),
        duration_expr: r#"//p[span[contains(text(), "长度")]]/text()"#.into(),
        studio_expr: r#"//p[contains(text(),"制作商: ")]/following-sibling::p[1]/a/text()"#
            .into(),
        series_expr: r#"//p[contains(text(),"系列:")]/following-sibling::p[1]/a/text()"#.into(),
        genre_list_expr: r#"//p[span[@class="genre"]]/span/a[contains(@href, "genre")]"#.into(),
        cover_expr: "/html/body/div[2]/div[1]/div[1]/a/img/@src".into(),
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct Avsox {
    base_url: String,
    decoder: XPathHtmlDecoder,
}

impl Default for Avsox {
    fn default() -> Self {
        Self::new()
    }
}

impl Avsox {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            decoder: detail_rules(),
        }
    }

    /// Point the adapter at a mirror (or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from `[plugins.avsox]` arguments. Recognized key: `base_url`.
    pub fn create(args: Option<&PluginArgs>) -> Result<Self, PluginError> {
        let mut plugin = Self::new();
        let Some(args) = args else {
            return Ok(plugin);
        };
        if let Some(value) = args.get("base_url") {
            let base = value.as_str().ok_or_else(|| PluginError::InvalidArgs {
                plugin: AVSOX.to_string(),
                reason: format!("base_url must be a string, got {}", value.type_str()),
            })?;
            reqwest::Url::parse(base).map_err(|e| PluginError::InvalidArgs {
                plugin: AVSOX.to_string(),
                reason: format!("base_url `{base}`: {e}"),
            })?;
            plugin = plugin.with_base_url(base);
        }
        Ok(plugin)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}/cn/search/{}", self.base_url, urlencoding::encode(query))
    }

    fn resolve_link(&self, link: &str) -> Result<reqwest::Url, PluginError> {
        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| PluginError::RequestConstruction(format!("{}: {e}", self.base_url)))?;
        base.join(link)
            .map_err(|e| PluginError::RequestConstruction(format!("{link}: {e}")))
    }

    /// Search each candidate in turn and return the detail page URL.
    async fn find_detail_link(
        &self,
        ctx: &PluginContext,
        invoker: &dyn HttpInvoker,
        template: &reqwest::Request,
        candidates: &[String],
    ) -> Result<reqwest::Url, PluginError> {
        for query in candidates {
            let mut req = get_request(&self.search_url(query))?;
            *req.headers_mut() = template.headers().clone();

            let resp = invoker.invoke(ctx, req).await?;
            check_status(&resp)?;
            let body = resp.bytes().await?;
            let links = movie_links(&body)?;

            match links.len() {
                0 => {
                    tracing::debug!(plugin = AVSOX, query = %query, "no search results, trying next spelling");
                }
                count if count > MAX_SEARCH_LINKS => {
                    return Err(PluginError::AmbiguousSearchResult {
                        query: query.clone(),
                        count,
                    });
                }
                count => {
                    tracing::debug!(plugin = AVSOX, query = %query, count, link = %links[0], "search matched");
                    return self.resolve_link(&links[0]);
                }
            }
        }
        Err(PluginError::NoSearchMatch {
            tried: candidates.to_vec(),
        })
    }
}

/// Candidate spellings for the search endpoint: the identifier itself, then
/// with dashes turned into underscores, then with separators dropped.
pub fn generate_try_list(number: &str) -> Vec<String> {
    let mut num = number.to_uppercase();
    if num.contains("FC2") && !num.contains("FC2-PPV") && !num.contains("FC2PPV") {
        num = num.replace("FC2", "FC2-PPV");
    }

    let mut list = vec![num];
    if let Some(last) = list.last().filter(|s| s.contains('-')) {
        let next = last.replace('-', "_");
        list.push(next);
    }
    if let Some(last) = list.last().filter(|s| s.contains('_')) {
        let next = last.replace('_', "");
        list.push(next);
    }
    list
}

/// 404 is left to the caller as a miss; any other failure status is an
/// error, not an empty result page.
fn check_status(resp: &reqwest::Response) -> Result<(), PluginError> {
    let status = resp.status();
    if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
        return Ok(());
    }
    Err(PluginError::UnexpectedStatus {
        url: resp.url().to_string(),
        status,
    })
}

fn movie_links(body: &[u8]) -> Result<Vec<String>, DecodeError> {
    let html = Html::parse_document(&String::from_utf8_lossy(body));
    Ok(decode_list(&html, SEARCH_LINK_EXPR)?
        .into_iter()
        .map(|link| link.trim().to_string())
        .filter(|link| link.contains("movie"))
        .collect())
}

impl Plugin for Avsox {
    /// The search page for the canonical spelling. Headers set on this
    /// request by later hooks are carried onto every search and detail
    /// request.
    fn build_request(
        &self,
        _ctx: &mut PluginContext,
        number: &Number,
    ) -> Result<reqwest::Request, PluginError> {
        get_request(&self.search_url(number.number()))
    }

    fn handle_request<'a>(
        &'a self,
        ctx: &'a mut PluginContext,
        invoker: &'a dyn HttpInvoker,
        req: reqwest::Request,
    ) -> BoxFuture<'a, Result<reqwest::Response, PluginError>> {
        Box::pin(async move {
            let number = ctx
                .number()
                .map(|n| n.number().to_string())
                .ok_or_else(|| PluginError::RequestConstruction("no identifier in context".into()))?;

            let candidates = generate_try_list(&number);
            tracing::debug!(plugin = AVSOX, count = candidates.len(), list = ?candidates, "built candidate list");

            let link = self.find_detail_link(ctx, invoker, &req, &candidates).await?;
            let mut detail = reqwest::Request::new(reqwest::Method::GET, link);
            *detail.headers_mut() = req.headers().clone();
            let resp = invoker.invoke(ctx, detail).await?;
            check_status(&resp)?;
            Ok(resp)
        })
    }

    fn decode_response(
        &self,
        _ctx: &mut PluginContext,
        data: &[u8],
    ) -> Result<Option<AvMeta>, PluginError> {
        let decoded = self.decoder.decode_html(data, &DecodeOptions::default())?;
        if !decoded.degraded.is_empty() {
            tracing::debug!(plugin = AVSOX, fields = ?decoded.degraded, "some fields could not be parsed");
        }
        Ok(decoded.has_number.then_some(decoded.meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::File;
    use crate::plugin::mock::MockInvoker;
    use crate::plugin::{Outcome, PluginRunner, Stage};
    use std::sync::Arc;

    const BASE: &str = "https://avsox.test";

    fn search_page(links: &[&str]) -> String {
        let items: String = links
            .iter()
            .map(|l| format!(r#"<div class="item"><a class="movie-box" href="{l}">x</a></div>"#))
            .collect();
        format!(r#"<html><body><div id="waterfall">{items}</div></body></html>"#)
    }

    const DETAIL_PAGE: &str = r##"<html><body>
<div class="navbar"></div>
<div class="container">
  <h3>ABC-123 Sample Title</h3>
  <div class="row movie">
    <div class="col-md-9 screencap"><a class="bigImage" href="#"><img src="https://img.avsox.test/cover/abc123.jpg"></a></div>
    <div class="col-md-3 info">
      <p><span class="header">识别码:</span> <span style="color:#CC0000;">ABC-123</span></p>
      <p><span class="header">发行时间:</span> 2021-03-04</p>
      <p><span class="header">长度:</span> 120分钟</p>
      <p class="header">制作商: </p>
      <p><a href="https://avsox.test/cn/studio/1">Studio One</a></p>
      <p class="header">系列:</p>
      <p><a href="https://avsox.test/cn/series/2">Series Two</a></p>
      <p class="header">类别:</p>
      <p><span class="genre"><a href="https://avsox.test/cn/genre/3">Drama</a></span><span class="genre"><a href="https://avsox.test/cn/genre/4">HD</a></span></p>
    </div>
  </div>
  <div id="avatar-waterfall"><a class="avatar-box" href="#"><div class="photo-frame"></div><span>Alice</span></a></div>
</div>
</body></html>"##;

    fn plugin() -> Avsox {
        Avsox::new().with_base_url(BASE)
    }

    async fn run(mock: MockInvoker, input: &str) -> (Result<Outcome, crate::plugin::SearchError>, Arc<MockInvoker>) {
        let mock = Arc::new(mock);
        let runner = PluginRunner::new(mock.clone());
        let mut ctx = PluginContext::default();
        let number = Number::parse(input).unwrap();
        let result = runner.search(AVSOX, &plugin(), &mut ctx, &number).await;
        (result, mock)
    }

    // ── candidate list ──────────────────────────────────────────────────

    #[test]
    fn try_list_dash_underscore_plain_chain() {
        assert_eq!(generate_try_list("abc-123"), vec!["ABC-123", "ABC_123", "ABC123"]);
    }

    #[test]
    fn try_list_rewrites_bare_fc2() {
        let list = generate_try_list("FC2-1234567");
        assert_eq!(list[0], "FC2-PPV-1234567");
        assert_eq!(list, vec!["FC2-PPV-1234567", "FC2_PPV_1234567", "FC2PPV1234567"]);
    }

    #[test]
    fn try_list_keeps_existing_ppv() {
        assert_eq!(generate_try_list("FC2-PPV-1234567")[0], "FC2-PPV-1234567");
        assert_eq!(generate_try_list("FC2PPV1234567"), vec!["FC2PPV1234567"]);
    }

    #[test]
    fn try_list_without_separators() {
        assert_eq!(generate_try_list("ABC123"), vec!["ABC123"]);
        assert_eq!(generate_try_list("ABC_123"), vec!["ABC_123", "ABC123"]);
    }

    // ── search loop ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_candidate_hit_fetches_detail() {
        let mock = MockInvoker::new()
            .with_route(
                "https://avsox.test/cn/search/ABC-123",
                200,
                search_page(&["//avsox.test/cn/movie/abc123"]),
            )
            .with_route("https://avsox.test/cn/movie/abc123", 200, DETAIL_PAGE);
        let (result, mock) = run(mock, "abc-123.mp4").await;

        let Outcome::Found(meta) = result.unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(meta.number, "ABC-123");
        assert_eq!(meta.title, "ABC-123 Sample Title");
        assert_eq!(meta.actors, vec!["Alice"]);
        assert_eq!(meta.release_date, 1614816000);
        assert_eq!(meta.duration, 7200);
        assert_eq!(meta.studio, "Studio One");
        assert_eq!(meta.series, "Series Two");
        assert_eq!(meta.genres, vec!["Drama", "HD"]);
        assert_eq!(
            meta.cover,
            Some(File::from_url("https://img.avsox.test/cover/abc123.jpg"))
        );
        assert_eq!(
            mock.calls(),
            vec![
                "https://avsox.test/cn/search/ABC-123",
                "https://avsox.test/cn/movie/abc123",
            ]
        );
    }

    #[tokio::test]
    async fn empty_results_fall_through_to_next_spelling() {
        let mock = MockInvoker::new()
            .with_route("https://avsox.test/cn/search/ABC-123", 200, search_page(&[]))
            .with_route(
                "https://avsox.test/cn/search/ABC_123",
                200,
                search_page(&["/cn/tag/not-a-film"]),
            )
            .with_route(
                "https://avsox.test/cn/search/ABC123",
                200,
                search_page(&["/cn/movie/abc123", "/cn/movie/abc123b"]),
            )
            .with_route("https://avsox.test/cn/movie/abc123", 200, DETAIL_PAGE);
        let (result, mock) = run(mock, "ABC-123").await;

        assert!(matches!(result.unwrap(), Outcome::Found(_)));
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.calls()[3], "https://avsox.test/cn/movie/abc123");
    }

    #[tokio::test]
    async fn too_many_results_is_ambiguous() {
        let links: Vec<String> = (0..6).map(|i| format!("/cn/movie/m{i}")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mock = MockInvoker::new().with_route(
            "https://avsox.test/cn/search/ABC-123",
            200,
            search_page(&refs),
        );
        let (result, mock) = run(mock, "ABC-123").await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.source,
            PluginError::AmbiguousSearchResult { count: 6, .. }
        ));
        assert_eq!(mock.call_count(), 1, "no further candidates are tried");
    }

    #[tokio::test]
    async fn five_results_still_pick_the_first() {
        let links: Vec<String> = (0..5).map(|i| format!("/cn/movie/m{i}")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mock = MockInvoker::new()
            .with_route(
                "https://avsox.test/cn/search/ABC-123",
                200,
                search_page(&refs),
            )
            .with_route("https://avsox.test/cn/movie/m0", 200, DETAIL_PAGE);
        let (result, _) = run(mock, "ABC-123").await;
        assert!(matches!(result.unwrap(), Outcome::Found(_)));
    }

    #[tokio::test]
    async fn exhausted_candidates_report_no_match() {
        let (result, mock) = run(MockInvoker::new(), "ABC-123").await;
        let err = result.unwrap_err();
        let PluginError::NoSearchMatch { tried } = &err.source else {
            panic!("expected NoSearchMatch, got {err}");
        };
        assert_eq!(tried, &vec!["ABC-123", "ABC_123", "ABC123"]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn detail_without_identifier_is_not_found() {
        let mock = MockInvoker::new()
            .with_route(
                "https://avsox.test/cn/search/ABC-123",
                200,
                search_page(&["/cn/movie/abc123"]),
            )
            .with_route(
                "https://avsox.test/cn/movie/abc123",
                200,
                "<html><body><h3>Removed</h3></body></html>",
            );
        let (result, _) = run(mock, "ABC-123").await;
        assert_eq!(result.unwrap(), Outcome::NotFound);
    }

    #[tokio::test]
    async fn failing_search_status_is_not_a_miss() {
        let mock = MockInvoker::new()
            .with_route("https://avsox.test/cn/search/ABC-123", 503, "busy")
            .with_route("https://avsox.test/cn/search/ABC_123", 503, "busy")
            .with_route("https://avsox.test/cn/search/ABC123", 503, "busy");
        let (result, mock) = run(mock, "ABC-123").await;

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::HandleRequest);
        let PluginError::UnexpectedStatus { url, status } = &err.source else {
            panic!("expected UnexpectedStatus, got {err}");
        };
        assert_eq!(url, "https://avsox.test/cn/search/ABC-123");
        assert_eq!(status.as_u16(), 503);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_detail_status_is_an_error() {
        let mock = MockInvoker::new()
            .with_route(
                "https://avsox.test/cn/search/ABC-123",
                200,
                search_page(&["/cn/movie/abc123"]),
            )
            .with_route("https://avsox.test/cn/movie/abc123", 403, "blocked");
        let (result, _) = run(mock, "ABC-123").await;

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::HandleRequest);
        assert!(matches!(
            err.source,
            PluginError::UnexpectedStatus { status, .. } if status.as_u16() == 403
        ));
    }

    #[tokio::test]
    async fn missing_detail_page_is_not_found() {
        let mock = MockInvoker::new().with_route(
            "https://avsox.test/cn/search/ABC-123",
            200,
            search_page(&["/cn/movie/gone"]),
        );
        let (result, _) = run(mock, "ABC-123").await;
        assert_eq!(result.unwrap(), Outcome::NotFound);
    }

    #[tokio::test]
    async fn transport_error_stops_the_candidate_loop() {
        let mock = MockInvoker::new()
            .with_transport_error("https://avsox.test/cn/search/ABC-123")
            .with_route(
                "https://avsox.test/cn/search/ABC_123",
                200,
                search_page(&["/cn/movie/abc123"]),
            )
            .with_route("https://avsox.test/cn/movie/abc123", 200, DETAIL_PAGE);
        let (result, mock) = run(mock, "ABC-123").await;

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::HandleRequest);
        assert!(matches!(err.source, PluginError::Transport(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_candidate_loop() {
        let mock = MockInvoker::new();
        let cancel = tokio_util::sync::CancellationToken::new();
        let mut ctx = PluginContext::new(cancel.clone());
        ctx.set_number(Number::parse("ABC-123").unwrap());
        cancel.cancel();

        let err = plugin()
            .handle_request(&mut ctx, &mock, get_request(BASE).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Cancelled));
        assert_eq!(mock.call_count(), 1);
    }

    // ── construction ────────────────────────────────────────────────────

    #[test]
    fn create_reads_base_url() {
        let args: PluginArgs = toml::from_str(r#"base_url = "https://mirror.example/""#).unwrap();
        let plugin = Avsox::create(Some(&args)).unwrap();
        assert_eq!(plugin.base_url(), "https://mirror.example");
        assert_eq!(Avsox::create(None).unwrap().base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn create_rejects_bad_base_url() {
        let args: PluginArgs = toml::from_str("base_url = 3").unwrap();
        assert!(matches!(
            Avsox::create(Some(&args)),
            Err(PluginError::InvalidArgs { .. })
        ));
        let args: PluginArgs = toml::from_str(r#"base_url = "nope""#).unwrap();
        assert!(Avsox::create(Some(&args)).is_err());
    }

    #[test]
    fn search_url_is_percent_encoded() {
        assert_eq!(
            plugin().search_url("ABC 123"),
            "https://avsox.test/cn/search/ABC%20123"
        );
    }
}
