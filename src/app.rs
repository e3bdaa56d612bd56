//! Channel stats server API

use crate::app_state::{AppState, SharedAppState};
use crate::channels;
use crate::cli::CommandLineArgs;
use crate::dataset::{self, Dataset};
use crate::date_range::DateRange;
use crate::error::ChannelStatsError;
use crate::metrics::{self, metrics_handler, record_response_metrics, request_counter};
use crate::models::{ChannelRequest, ChannelStats, Channels, FileId, StatsRequest};
use crate::object_store::StoredObject;
use crate::query_params::QueryParams;
use crate::statistics;
use crate::validated_json::ValidatedJson;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

/// `tower_http::normalize_path::NormalizePath` wrapping the `axum::Router`.
pub type Service = NormalizePath<Router>;

/// Initialise the application
pub fn init(args: &CommandLineArgs) {
    if args.use_rayon {
        if let Some(thread_limit) = args.thread_limit {
            if let Err(err) = rayon::ThreadPoolBuilder::new()
                .num_threads(thread_limit)
                .build_global()
            {
                tracing::warn!("Failed to configure Rayon thread pool: {}", err);
            }
        }
    }
}

/// Returns a [axum::Router] with all routes and middleware, awaiting application state.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn router(args: &CommandLineArgs) -> Router<SharedAppState> {
    Router::new()
        .route("/.well-known/channel-stats-schema", get(schema))
        .route("/channels", get(get_channels).post(post_channels))
        .route("/channels/:file_id", get(get_file_channels))
        .route("/stats", get(get_stats).post(post_stats))
        .route("/stats/:file_id", get(get_file_stats))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(args.max_upload_size)),
        )
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .on_request(request_counter)
                .on_response(record_response_metrics),
        )
}

/// Returns a [crate::app::Service] serving the API.
///
/// Trailing slashes are removed from request paths before routing.
///
/// # Arguments
///
/// * `state`: Shared application state
pub fn service(state: SharedAppState) -> Service {
    let router = router(&state.args).with_state(state);
    ServiceBuilder::new()
        .layer(NormalizePathLayer::trim_trailing_slash())
        .service(router)
}

async fn schema() -> &'static str {
    "Hello, world!"
}

/// Run a CPU-bound task.
///
/// The task runs on the Rayon thread pool if enabled, otherwise inline once a task permit is
/// acquired.
async fn run_task<F, T>(state: &AppState, task: F) -> Result<T, ChannelStatsError>
where
    F: FnOnce() -> Result<T, ChannelStatsError> + Send + 'static,
    T: Send + 'static,
{
    if state.args.use_rayon {
        tokio_rayon::spawn(task).await
    } else {
        let _task_permit = state.resource_manager.task().await?;
        task()
    }
}

/// List the channels of a data file, grouped by channel type.
#[tracing::instrument(level = "DEBUG", skip(state))]
async fn list_channels(
    state: &AppState,
    request: ChannelRequest,
) -> Result<Channels, ChannelStatsError> {
    let channel_types = request.channel_types()?;
    let StoredObject {
        data,
        memory_permit: _memory_permit,
    } = state
        .file_store
        .load(&request.file_id, &state.resource_manager)
        .await?;
    run_task(state, move || {
        let names = dataset::read_channel_names(data)?;
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Ok(channels::sort_channels(&names, &channel_types))
    })
    .await
}

/// Compute statistics of the channels of a data file.
#[tracing::instrument(level = "DEBUG", skip(state))]
async fn channel_stats(
    state: &AppState,
    request: StatsRequest,
) -> Result<ChannelStats, ChannelStatsError> {
    let range = DateRange::parse(request.start_date(), request.end_date())?;
    let channel_ids = request.channel_ids();
    let StoredObject {
        data,
        memory_permit: _memory_permit,
    } = state
        .file_store
        .load(&request.file_id, &state.resource_manager)
        .await?;
    run_task(state, move || {
        let dataset = Dataset::from_parquet(data)?;
        statistics::compute_stats(&dataset, &channel_ids, &range)
    })
    .await
}

async fn get_channels(
    State(state): State<SharedAppState>,
    params: QueryParams,
) -> Result<Json<Channels>, ChannelStatsError> {
    let request = params.channel_request(None)?;
    list_channels(&state, request).await.map(Json)
}

async fn get_file_channels(
    State(state): State<SharedAppState>,
    Path(file_id): Path<String>,
    params: QueryParams,
) -> Result<Json<Channels>, ChannelStatsError> {
    let request = params.channel_request(Some(file_id))?;
    list_channels(&state, request).await.map(Json)
}

async fn post_channels(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<ChannelRequest>,
) -> Result<Json<Channels>, ChannelStatsError> {
    list_channels(&state, request).await.map(Json)
}

async fn get_stats(
    State(state): State<SharedAppState>,
    params: QueryParams,
) -> Result<Json<ChannelStats>, ChannelStatsError> {
    let request = params.stats_request(None)?;
    channel_stats(&state, request).await.map(Json)
}

async fn get_file_stats(
    State(state): State<SharedAppState>,
    Path(file_id): Path<String>,
    params: QueryParams,
) -> Result<Json<ChannelStats>, ChannelStatsError> {
    let request = params.stats_request(Some(file_id))?;
    channel_stats(&state, request).await.map(Json)
}

async fn post_stats(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<StatsRequest>,
) -> Result<Json<ChannelStats>, ChannelStatsError> {
    channel_stats(&state, request).await.map(Json)
}

/// Store an uploaded Parquet data file.
async fn upload(
    State(state): State<SharedAppState>,
    body: Bytes,
) -> Result<Json<FileId>, ChannelStatsError> {
    let file_id = state
        .file_store
        .upload(body, &state.resource_manager)
        .await?;
    metrics::record_upload(file_id.stored);
    Ok(Json(file_id))
}

#[cfg(test)]
mod tests {
    // https://github.com/tokio-rs/axum/blob/main/examples/testing/src/main.rs

    use super::*;
    use crate::file_store;
    use crate::models::Stats;
    use crate::object_store::InMemoryObjectStore;
    use crate::test_utils::{
        get_test_parquet, get_test_parquet_without_index, TEST_CHANNEL_NAMES, TEST_FILE_ID,
    };

    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
        response::Response,
    };
    use clap::Parser;
    use regex::Regex;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot` and `ready`

    fn test_state_with_args(extra_args: &[&str]) -> SharedAppState {
        let mut args = vec!["channel-stats", "--max-upload-size", "1 MiB"];
        args.extend_from_slice(extra_args);
        let args = CommandLineArgs::parse_from(args);
        Arc::new(AppState::with_store(
            &args,
            Arc::new(InMemoryObjectStore::new()),
        ))
    }

    fn test_state() -> SharedAppState {
        test_state_with_args(&[])
    }

    // Make a oneshot request against a fresh service sharing the state.
    async fn request(state: &SharedAppState, request: Request<Body>) -> Response {
        service(state.clone()).oneshot(request).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_upload(data: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(http::Method::POST)
            .uri("/upload")
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.into())
            .unwrap()
    }

    // Jump through the hoops to get the body as a string.
    async fn body_string(response: Response) -> String {
        String::from_utf8(
            hyper::body::to_bytes(response.into_body())
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap()
    }

    async fn body_json<T: DeserializeOwned>(response: Response) -> T {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    // Upload the test data file and return its identifier.
    async fn upload_test_file(state: &SharedAppState) -> String {
        let response = request(state, post_upload(get_test_parquet())).await;
        assert_eq!(StatusCode::OK, response.status());
        body_json::<FileId>(response).await.file_id
    }

    async fn assert_error(response: Response, status: StatusCode, message: &str) {
        assert_eq!(status, response.status());
        let body = body_string(response).await;
        let re = Regex::new(&regex::escape(message)).unwrap();
        assert!(re.is_match(&body), "body: {body}");
    }

    fn assert_close(expected: f64, actual: Option<f64>) {
        let actual = actual.unwrap();
        assert!(
            (expected - actual).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test]
    async fn schema() {
        let state = test_state();
        let response = request(&state, get("/.well-known/channel-stats-schema")).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!("Hello, world!", body_string(response).await);
    }

    #[tokio::test]
    async fn metrics() {
        let state = test_state();
        let response = request(&state, get("/metrics")).await;
        assert_eq!(StatusCode::OK, response.status());
    }

    #[tokio::test]
    async fn upload_twice() {
        let state = test_state();
        let data = get_test_parquet();

        let response = request(&state, post_upload(data.clone())).await;
        assert_eq!(StatusCode::OK, response.status());
        let first: FileId = body_json(response).await;
        assert_eq!(file_store::file_id(&data), first.file_id);
        assert!(first.stored);

        let response = request(&state, post_upload(data)).await;
        assert_eq!(StatusCode::OK, response.status());
        let second: FileId = body_json(response).await;
        assert_eq!(first.file_id, second.file_id);
        assert!(!second.stored);
    }

    #[tokio::test]
    async fn upload_empty() {
        let state = test_state();
        let response = request(&state, post_upload(Body::empty())).await;
        assert_error(response, StatusCode::BAD_REQUEST, "upload payload is empty").await;
    }

    #[tokio::test]
    async fn upload_not_parquet() {
        let state = test_state();
        let response = request(&state, post_upload("timestamp,vel58.3\n2019-05-01,1.0\n")).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "failed to read data file",
        )
        .await;
    }

    #[tokio::test]
    async fn upload_without_time_index() {
        let args = CommandLineArgs::parse_from(["channel-stats"]);
        let store = Arc::new(InMemoryObjectStore::new());
        let state = Arc::new(AppState::with_store(&args, store.clone()));
        let response = request(&state, post_upload(get_test_parquet_without_index())).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "data file has no time index column",
        )
        .await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn upload_too_large() {
        let state = test_state();
        let response = request(&state, post_upload(vec![0_u8; 2 * 1024 * 1024])).await;
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, response.status());
    }

    #[tokio::test]
    async fn upload_wrong_method() {
        let state = test_state();
        let response = request(&state, get("/upload")).await;
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, response.status());
    }

    #[tokio::test]
    async fn channels_all_types() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let response = request(&state, get(&format!("/channels/{file_id}"))).await;
        assert_eq!(StatusCode::OK, response.status());
        let channels: Value = body_json(response).await;
        assert_eq!(
            json!({
                "vel": ["vel58.3", "vel47.5", "vel32"],
                "std": ["std58.3", "std47.5", "std32"],
                "std_dtr": ["std58.3_detrend", "std47.5_detrend", "std32_detrend"],
                "temp": ["temp56.8", "temp10"],
                "hum": ["hum56.8"],
                "press": ["press56.8"],
                "dir": ["dir56.3"],
                "sdir": ["sdir56.3"]
            }),
            channels
        );
    }

    #[tokio::test]
    async fn channels_query_repeated_types() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!(
            "/channels?file_id={file_id}&channel_type=vel&channel_type=hum&channel_type=vel"
        );
        let response = request(&state, get(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        let channels: Value = body_json(response).await;
        assert_eq!(
            json!({
                "vel": ["vel58.3", "vel47.5", "vel32"],
                "hum": ["hum56.8"]
            }),
            channels
        );
    }

    #[tokio::test]
    async fn channels_post() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let body = json!({"file_id": file_id, "channel_list": ["std_dtr", "sdir"]});
        let response = request(&state, post_json("/channels", body)).await;
        assert_eq!(StatusCode::OK, response.status());
        let channels: Channels = body_json(response).await;
        assert_eq!(
            Channels {
                std_dtr: Some(vec![
                    "std58.3_detrend".into(),
                    "std47.5_detrend".into(),
                    "std32_detrend".into()
                ]),
                sdir: Some(vec!["sdir56.3".into()]),
                ..Default::default()
            },
            channels
        );
    }

    #[tokio::test]
    async fn channels_invalid_type() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/channels/{file_id}?channel_type=velocity");
        let response = request(&state, get(&uri)).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Requested invalid channel type: velocity",
        )
        .await;
    }

    #[tokio::test]
    async fn channels_unknown_file() {
        let state = test_state();
        let response = request(&state, get(&format!("/channels/{TEST_FILE_ID}"))).await;
        assert_error(
            response,
            StatusCode::NOT_FOUND,
            &format!("data file {TEST_FILE_ID} not found"),
        )
        .await;
    }

    #[tokio::test]
    async fn channels_invalid_file_id() {
        let state = test_state();
        let response = request(&state, get("/channels/not-a-digest")).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "file_id must be a 32 character lowercase hex MD5 digest",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_full_series() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let response = request(&state, get(&format!("/stats?file_id={file_id}"))).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        assert_eq!(TEST_CHANNEL_NAMES.len(), stats.len());
        assert_close(4.5, stats["vel58.3"].mean);
        assert_close((55.0_f64 / 6.0).sqrt(), stats["vel58.3"].std);
    }

    #[tokio::test]
    async fn stats_path_with_channels_and_range() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!(
            "/stats/{file_id}?channel_id=vel58.3&channel_id=temp10&start_date=2019-05-27&end_date=2019-07-27"
        );
        let response = request(&state, get(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        assert_eq!(vec!["temp10", "vel58.3"], stats.keys().collect::<Vec<_>>());
        assert_close(5.5, stats["vel58.3"].mean);
        assert_close(6.0_f64.sqrt(), stats["vel58.3"].std);
        assert_close(19.5, stats["temp10"].mean);
    }

    #[tokio::test]
    async fn stats_post() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let body = json!({
            "file_id": file_id,
            "channel_ids": ["vel58.3", "vel58.3"],
            "date_range": ["2019-05-27", "2019-07-27"]
        });
        let response = request(&state, post_json("/stats", body)).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        assert_eq!(1, stats.len());
        assert_close(5.5, stats["vel58.3"].mean);
    }

    #[tokio::test]
    async fn stats_start_date_only() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let body = json!({
            "file_id": file_id,
            "channel_ids": ["vel58.3"],
            "date_range": ["2019-05-30"]
        });
        let response = request(&state, post_json("/stats", body)).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        // Rows 5 to 9, up to today.
        assert_close(7.0, stats["vel58.3"].mean);
        assert_close(2.5_f64.sqrt(), stats["vel58.3"].std);
    }

    #[tokio::test]
    async fn stats_range_without_rows() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?start_date=2020-01-01&end_date=2020-02-01");
        let response = request(&state, get(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        assert_eq!(TEST_CHANNEL_NAMES.len(), stats.len());
        assert!(stats.values().all(|stats| *stats
            == Stats {
                mean: None,
                std: None
            }));
    }

    #[tokio::test]
    async fn stats_unknown_channel() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?channel_id=vel58.3&channel_id=foo");
        let response = request(&state, get(&uri)).await;
        assert_error(
            response,
            StatusCode::NOT_FOUND,
            "Channel_id foo is not available",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_non_numeric_channel() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?channel_id=station");
        let response = request(&state, get(&uri)).await;
        assert_error(
            response,
            StatusCode::NOT_FOUND,
            "Channel_id station is not available",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_end_date_without_start_date() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let body = json!({"file_id": file_id, "date_range": [null, "2019-07-27"]});
        let response = request(&state, post_json("/stats", body)).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Cannot provide end_date without start_date",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_inverted_range() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?start_date=2019-07-27&end_date=2019-05-27");
        let response = request(&state, get(&uri)).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Start_date 2019-07-27 00:00:00 greater than end_date 2019-05-27 00:00:00",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_invalid_date() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?start_date=27/05/2019");
        let response = request(&state, get(&uri)).await;
        assert_error(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid start_date: 27/05/2019",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_malformed_json() {
        let state = test_state();
        let response = request(
            &state,
            Request::builder()
                .method(http::Method::POST)
                .uri("/stats")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(Body::from("{\"file_id\""))
                .unwrap(),
        )
        .await;
        assert_error(
            response,
            StatusCode::BAD_REQUEST,
            "Failed to parse the request body as JSON",
        )
        .await;
    }

    #[tokio::test]
    async fn stats_trailing_slash() {
        let state = test_state();
        let file_id = upload_test_file(&state).await;
        let response = request(&state, get(&format!("/stats/{file_id}/"))).await;
        assert_eq!(StatusCode::OK, response.status());
    }

    #[tokio::test]
    async fn stats_with_rayon() {
        let state = test_state_with_args(&["--use-rayon"]);
        let file_id = upload_test_file(&state).await;
        let uri = format!("/stats/{file_id}?channel_id=vel58.3");
        let response = request(&state, get(&uri)).await;
        assert_eq!(StatusCode::OK, response.status());
        let stats: ChannelStats = body_json(response).await;
        assert_close(4.5, stats["vel58.3"].mean);
    }

    #[tokio::test]
    async fn stats_insufficient_memory() {
        let state = test_state_with_args(&["--memory-limit", "16"]);
        let file_id = upload_test_file(&state).await;
        let response = request(&state, get(&format!("/stats/{file_id}"))).await;
        assert_error(
            response,
            StatusCode::BAD_REQUEST,
            "Insufficient memory to process request",
        )
        .await;
    }
}
