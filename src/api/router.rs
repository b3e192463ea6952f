use axum::{
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api::{assignments, handlers, students, submissions, videos};
use crate::core::{config::Settings, state::AppState};

pub(crate) fn router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings());
    let api_v1_prefix = state.settings().api().api_v1_str.clone();
    let api_v1 = Router::new()
        .nest("/assignments", assignments::router())
        .nest("/submissions", submissions::router())
        .nest("/students", students::router())
        .nest("/videos", videos::router())
        .route("/badges", get(handlers::badges));

    let request_id_header = HeaderName::from_static("x-request-id");
    let request_id_header_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_header_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(|response: &Response<axum::body::Body>, latency: Duration, _span: &Span| {
            let status_label = response.status().as_u16().to_string();
            metrics::counter!(
                "http_requests_total",
                "status" => status_label.clone()
            )
            .increment(1);
            metrics::histogram!(
                "http_request_duration_seconds",
                "status" => status_label
            )
            .record(latency.as_secs_f64());
        });

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&api_v1_prefix, api_v1)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors);

    if state.settings().telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        // Wildcard origin cannot be combined with allow_credentials
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true)
            .allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use super::router;
    use axum::{body::Body, http::Method, http::Request, http::StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::{config::Settings, metrics};
    use crate::db::types::{SubmissionStatus, UserRole};
    use crate::services::grading::{GradingSubject, Stage};
    use crate::test_support::{
        self, bearer_token, json_request, read_json, sample_assignment, test_state,
        InMemorySubmissionStore, ScriptedOracle,
    };

    fn graded_oracle() -> ScriptedOracle {
        ScriptedOracle::new()
            .reply(Stage::AnswerVerification, r#"{"accuracyScore": 95, "isCorrect": true}"#)
            .reply(Stage::TopicRelevance, r#"{"relevanceScore": 95, "isRelevant": true}"#)
            .reply(Stage::QualityAnalysis, r#"{"qualityScore": 90}"#)
            .reply(Stage::OriginalityCheck, r#"{"originalityScore": 80}"#)
    }

    fn stored_submission(status: SubmissionStatus) -> InMemorySubmissionStore {
        InMemorySubmissionStore::with(GradingSubject {
            submission_id: "sub-1".to_string(),
            assignment_id: "asg-1".to_string(),
            student_id: "student-1".to_string(),
            content: "Water evaporates, condenses into clouds and falls as rain.".to_string(),
            status,
            assignment: sample_assignment(),
        })
    }

    async fn load_settings() -> (tokio::sync::OwnedMutexGuard<()>, Settings) {
        let guard = test_support::env_lock().await;
        test_support::set_test_env();
        (guard, Settings::load().expect("settings"))
    }

    #[tokio::test]
    async fn root_returns_message() {
        let (_guard, settings) = load_settings().await;
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["message"], "SchoolHub API");
        assert_eq!(json["api_prefix"], "/api/v1");
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let (_guard, settings) = load_settings().await;
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PROMETHEUS_ENABLED", "1");

        let settings = Settings::load().expect("settings");
        metrics::init(&settings).expect("metrics init");
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        std::env::set_var("PROMETHEUS_ENABLED", "0");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (_guard, settings) = load_settings().await;
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(json_request(
                Method::GET,
                "/api/v1/students/student-1/progression",
                None,
                None,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }

    #[tokio::test]
    async fn students_cannot_create_assignments() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("student-1", UserRole::Student, &settings);
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/assignments",
                Some(&token),
                Some(json!({"title": "Water cycle", "subject": "Science", "max_points": 10})),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn badge_catalog_is_listed() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("student-1", UserRole::Student, &settings);
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(json_request(Method::GET, "/api/v1/badges", Some(&token), None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        let levels: Vec<u64> = json
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|badge| badge["level"].as_u64())
            .collect();
        assert_eq!(levels, vec![2, 3, 5, 7, 10, 15, 20, 25, 30, 50]);
    }

    #[tokio::test]
    async fn student_reads_only_own_progression() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("student-1", UserRole::Student, &settings);
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let own = app
            .clone()
            .oneshot(json_request(
                Method::GET,
                "/api/v1/students/student-1/progression",
                Some(&token),
                None,
            ))
            .await
            .expect("response");
        assert_eq!(own.status(), StatusCode::OK);
        let json = read_json(own).await;
        assert_eq!(json["level"], 1);
        assert_eq!(json["currentXP"], 0);
        assert_eq!(json["nextLevelXP"], 100);
        assert_eq!(json["wallet"]["coins"], 0);

        let other = app
            .oneshot(json_request(
                Method::GET,
                "/api/v1/students/student-2/progression",
                Some(&token),
                None,
            ))
            .await
            .expect("response");
        assert_eq!(other.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn activity_is_rewarded_once_then_redeemed() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("student-1", UserRole::Student, &settings);
        let (state, services) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);
        let activity = json!({"kind": "quiz", "source_id": "quiz-1", "amount": 5});

        let first = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/students/student-1/activities",
                Some(&token),
                Some(activity.clone()),
            ))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let json = read_json(first).await;
        assert_eq!(json["xpAwarded"], 50);
        assert_eq!(json["coinsAwarded"], 5);

        let replay = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/students/student-1/activities",
                Some(&token),
                Some(activity),
            ))
            .await
            .expect("response");
        assert_eq!(read_json(replay).await["alreadyAwarded"], true);

        let self_graded = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/students/student-1/activities",
                Some(&token),
                Some(json!({"kind": "assignment", "source_id": "asg-1", "amount": 100})),
            ))
            .await
            .expect("response");
        assert_eq!(self_graded.status(), StatusCode::BAD_REQUEST);

        let too_expensive = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/students/student-1/redemptions",
                Some(&token),
                Some(json!({"reward": "Field trip", "cost": 50})),
            ))
            .await
            .expect("response");
        assert_eq!(too_expensive.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let redeemed = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/students/student-1/redemptions",
                Some(&token),
                Some(json!({"reward": "Sticker", "cost": 2})),
            ))
            .await
            .expect("response");
        assert_eq!(redeemed.status(), StatusCode::OK);
        assert_eq!(read_json(redeemed).await["wallet"]["coins"], 3);

        let stored = services.progression.snapshot("student-1").expect("stored");
        assert_eq!(stored.progression.current_xp, 50);
        assert_eq!(stored.wallet.redemptions.len(), 1);
    }

    #[tokio::test]
    async fn teacher_regrade_returns_grading_payload() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("teacher-1", UserRole::Teacher, &settings);
        let (state, services) = test_state(
            settings,
            graded_oracle(),
            stored_submission(SubmissionStatus::AiGraded),
        );
        let app = router(state);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/submissions/sub-1/regrade",
                Some(&token),
                None,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["grade"], "A+");
        assert_eq!(json["score"], 9);
        assert_eq!(json["maxPoints"], 10);
        assert_eq!(json["aiGrading"]["scores"]["overall"], 93);
        assert_eq!(services.submissions.status("sub-1"), Some(SubmissionStatus::AiGraded));
    }

    #[tokio::test]
    async fn student_cannot_regrade() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("student-1", UserRole::Student, &settings);
        let (state, services) = test_state(
            settings,
            graded_oracle(),
            stored_submission(SubmissionStatus::Submitted),
        );
        let app = router(state);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/submissions/sub-1/regrade",
                Some(&token),
                None,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(services.submissions.status("sub-1"), Some(SubmissionStatus::Submitted));
    }

    #[tokio::test]
    async fn video_job_is_started_and_polled() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("teacher-1", UserRole::Teacher, &settings);
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let started = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/videos/generate",
                Some(&token),
                Some(json!({"lesson_title": "Fractions", "prompt": "Explain halves"})),
            ))
            .await
            .expect("response");
        assert_eq!(started.status(), StatusCode::ACCEPTED);
        let job = read_json(started).await;
        assert_eq!(job["status"], "processing");
        let job_id = job["id"].as_str().expect("job id").to_string();

        let polled = app
            .oneshot(json_request(
                Method::GET,
                &format!("/api/v1/videos/jobs/{job_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("response");
        assert_eq!(polled.status(), StatusCode::OK);
        let job = read_json(polled).await;
        assert_eq!(job["status"], "completed");
        assert_eq!(job["videoUrl"], "https://cdn.example/lesson.mp4");
    }

    #[tokio::test]
    async fn invalid_video_request_is_rejected() {
        let (_guard, settings) = load_settings().await;
        let token = bearer_token("teacher-1", UserRole::Teacher, &settings);
        let (state, _) = test_state(settings, ScriptedOracle::new(), Default::default());
        let app = router(state);

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/videos/generate",
                Some(&token),
                Some(json!({"lesson_title": "", "prompt": "Explain halves"})),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
