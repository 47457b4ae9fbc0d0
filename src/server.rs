use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::AppContext;
use crate::error::PredictError;
use crate::predictor;
use crate::rows;
use crate::ui::{self, Feedback, FormState};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7860";

const MAX_FORM_BYTES: usize = 64 * 1024;
const KNOWN_PATHS: [&str; 6] = ["/", "/predict", "/clear", "/show", "/status", "/health"];

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Accept loop; every connection is served on its own task.
pub async fn serve(ctx: Arc<AppContext>, listener: TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "revenue estimator listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle(ctx.clone(), req));
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %err, "connection error");
            }
        });
    }
}

async fn handle(
    ctx: Arc<AppContext>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path()
    );

    async move {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, MAX_FORM_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                warn!("request body over limit");
                return Ok(text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
            }
            Err(err) => {
                warn!(error = %err, "failed to read request body");
                return Ok(text_response(StatusCode::BAD_REQUEST, "unreadable request body"));
            }
        };

        let response = route(&ctx, &parts.method, parts.uri.path(), &body).await;
        info!(status = response.status().as_u16(), "request handled");
        Ok(response)
    }
    .instrument(span)
    .await
}

/// Maps one request onto the page actions and the status endpoints.
pub async fn route(
    ctx: &AppContext,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => page(ctx, &FormState::default(), &Feedback::welcome()),
        (&Method::POST, "/predict") => {
            let form = FormState::from_urlencoded(body);
            let result = match form.features() {
                Ok(features) => predictor::predict_and_save(ctx, features).await,
                Err(_) if !ctx.models.enabled() => Err(PredictError::ModelsUnavailable),
                Err(err) => Err(err),
            };
            page(ctx, &form, &Feedback::from_prediction(&result))
        }
        (&Method::POST, "/clear") => {
            let form = FormState::from_urlencoded(body);
            page(ctx, &form, &Feedback::from_clear(&rows::clear(ctx).await))
        }
        (&Method::POST, "/show") => {
            let form = FormState::from_urlencoded(body);
            let feedback = Feedback::from_show(&rows::show(ctx).await, ctx.sheet_url());
            page(ctx, &form, &feedback)
        }
        (&Method::GET, "/status") => json_response(StatusCode::OK, &ctx.status()),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (_, path) if KNOWN_PATHS.contains(&path) => {
            let allow = if matches!(path, "/" | "/status" | "/health") {
                "GET"
            } else {
                "POST"
            };
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(allow));
            response
        }
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

fn page(ctx: &AppContext, form: &FormState, feedback: &Feedback) -> Response<Full<Bytes>> {
    let html = ui::render_page(form, feedback, &ctx.status());
    response(StatusCode::OK, "text/html; charset=utf-8", html.into_bytes())
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => response(status, "application/json", body),
        Err(err) => text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("serialization failed: {err}"),
        ),
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    response(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
}

fn response(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::context;
    use crate::store::memory::MemoryRowStore;

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const ZERO_FORM: &[u8] = b"interactions=0&advisors=0&avg_interactions=0&goal_completion_pct=0&participation_pct=0&avg_enrollments=0&monthly_growth_pct=0&annual_growth_pct=0&interactions_per_advisor=0&enrollments_per_advisor=0";

    #[tokio::test]
    async fn index_renders_welcome_page() {
        let ctx = context(true, None);
        let response = route(&ctx, &Method::GET, "/", b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let html = body_text(response).await;
        assert!(html.contains("Enter the parameters and click"));
    }

    #[tokio::test]
    async fn predict_with_all_zero_form_warns_and_keeps_values() {
        let store = Arc::new(MemoryRowStore::new());
        let ctx = context(true, Some(store.clone()));
        let html = body_text(route(&ctx, &Method::POST, "/predict", ZERO_FORM).await).await;
        assert!(html.contains("Please enter valid values"));
        assert!(html.contains("name=\"interactions\" value=\"0\""));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn predict_without_models_reports_unavailable_even_for_bad_input() {
        let ctx = context(false, None);
        let html = body_text(route(&ctx, &Method::POST, "/predict", b"interactions=abc").await).await;
        assert!(html.contains("Error: ML models are not available"));
    }

    #[tokio::test]
    async fn predict_saves_row_and_renders_estimate() {
        let store = Arc::new(MemoryRowStore::new());
        let ctx = context(true, Some(store.clone()));
        let html = body_text(route(&ctx, &Method::POST, "/predict", b"interactions=1500&participation_pct=80").await).await;
        assert!(html.contains("Estimated revenue: $"));
        assert!(html.contains("class=\"result success\""));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn clear_and_show_degrade_without_spreadsheet() {
        let ctx = context(true, None);
        let html = body_text(route(&ctx, &Method::POST, "/clear", b"").await).await;
        assert!(html.contains("Spreadsheet not configured"));
        let html = body_text(route(&ctx, &Method::POST, "/show", b"").await).await;
        assert!(html.contains("Spreadsheet not configured"));
    }

    #[tokio::test]
    async fn clear_then_show_through_routes() {
        let store = Arc::new(MemoryRowStore::new());
        let ctx = context(true, Some(store));
        let html = body_text(route(&ctx, &Method::POST, "/clear", b"").await).await;
        assert!(html.contains("Data cleared in the spreadsheet"));
        let html = body_text(route(&ctx, &Method::POST, "/show", b"").await).await;
        assert!(html.contains("<li>Enrollments per advisor: 0</li>"));
    }

    #[tokio::test]
    async fn status_endpoint_reports_subsystems() {
        let ctx = context(false, None);
        let response = route(&ctx, &Method::GET, "/status", b"").await;
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let status: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(status["models"]["enabled"], false);
        assert_eq!(status["spreadsheet"]["enabled"], false);
        assert_eq!(status["spreadsheet_url"], "Not configured");
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() {
        let ctx = context(true, None);
        assert_eq!(route(&ctx, &Method::GET, "/missing", b"").await.status(), StatusCode::NOT_FOUND);
        let response = route(&ctx, &Method::GET, "/predict", b"").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
        let response = route(&ctx, &Method::DELETE, "/", b"").await;
        assert_eq!(response.headers()[ALLOW], "GET");
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = Arc::new(context(true, Some(Arc::new(MemoryRowStore::new()))));
        let server = tokio::spawn(serve(ctx, listener));

        let client = reqwest::Client::new();
        let health = client.get(format!("http://{addr}/health")).send().await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
        assert_eq!(health.text().await.unwrap(), "ok");

        let predicted = client
            .post(format!("http://{addr}/predict"))
            .form(&[("interactions", "1500"), ("participation_pct", "80")])
            .send()
            .await
            .unwrap();
        assert!(predicted.text().await.unwrap().contains("Data saved to the spreadsheet"));

        server.abort();
    }
}
