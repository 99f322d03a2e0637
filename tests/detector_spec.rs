use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine};
use holo_decor::analysis::{
    encode_jpeg, DetectWallRequest, DetectWallResponse, WallAnalyzer, WallDetectionClient,
};
use holo_decor::api::{create_router, create_router_with_auth, DetectorAuth, DetectorPolicy, StubDetector};
use holo_decor::config::PayloadEncoding;
use holo_decor::error::AnalysisError;
use holo_decor::models::{Frame, ImagePayload};

fn setup(policy: DetectorPolicy) -> TestServer {
    let app = create_router(StubDetector::new(policy));
    TestServer::new(app).expect("Failed to create test server")
}

fn scene(level: u8) -> ImagePayload {
    encode_jpeg(&Frame::solid(16, 16, [level, level, level, 255]), 85).expect("Failed to encode")
}

fn image_form(payload: &ImagePayload) -> MultipartForm {
    MultipartForm::new().add_part(
        "image",
        Part::bytes(payload.bytes.clone())
            .file_name(payload.file_name)
            .mime_type(payload.mime_type),
    )
}

/// Serve the router on an ephemeral port and return the detection URL.
async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}/detect-wall", addr)
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup(DetectorPolicy::Always);

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["requests"], 0);
    }
}

mod detect_wall {
    use super::*;

    #[tokio::test]
    async fn accepts_multipart_image_field() {
        let server = setup(DetectorPolicy::Always);

        let response = server
            .post("/detect-wall")
            .multipart(image_form(&scene(128)))
            .await;

        response.assert_status_ok();
        let body: DetectWallResponse = response.json();
        assert!(body.wall_detected);
    }

    #[tokio::test]
    async fn responds_with_camel_case_flag() {
        let server = setup(DetectorPolicy::Never);

        let response = server
            .post("/detect-wall")
            .multipart(image_form(&scene(128)))
            .await;

        let body: serde_json::Value = response.json();
        assert_eq!(body["wallDetected"], false);
    }

    #[tokio::test]
    async fn accepts_base64_json() {
        let server = setup(DetectorPolicy::Brightness);
        let payload = scene(128);

        let response = server
            .post("/detect-wall")
            .json(&DetectWallRequest {
                image: STANDARD.encode(&payload.bytes),
                mime_type: Some("image/jpeg".into()),
            })
            .await;

        response.assert_status_ok();
        assert!(response.json::<DetectWallResponse>().wall_detected);
    }

    #[tokio::test]
    async fn brightness_policy_rejects_dark_scenes() {
        let server = setup(DetectorPolicy::Brightness);

        let response = server
            .post("/detect-wall")
            .multipart(image_form(&scene(10)))
            .await;

        response.assert_status_ok();
        assert!(!response.json::<DetectWallResponse>().wall_detected);
    }

    #[tokio::test]
    async fn rejects_form_without_image_field() {
        let server = setup(DetectorPolicy::Always);
        let form = MultipartForm::new().add_text("note", "no image here");

        let response = server.post("/detect-wall").multipart(form).await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn rejects_undecodable_image() {
        let server = setup(DetectorPolicy::Always);

        let response = server
            .post("/detect-wall")
            .json(&DetectWallRequest {
                image: STANDARD.encode(b"definitely not a jpeg"),
                mime_type: None,
            })
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn requires_bearer_token_when_configured() {
        let app = create_router_with_auth(
            StubDetector::new(DetectorPolicy::Always),
            DetectorAuth::with_api_key("secret"),
        );
        let server = TestServer::new(app).expect("Failed to create test server");

        let denied = server
            .post("/detect-wall")
            .multipart(image_form(&scene(128)))
            .await;
        denied.assert_status(StatusCode::UNAUTHORIZED);

        let allowed = server
            .post("/detect-wall")
            .authorization_bearer("secret")
            .multipart(image_form(&scene(128)))
            .await;
        allowed.assert_status_ok();
    }
}

mod client_over_http {
    use super::*;

    #[tokio::test]
    async fn multipart_round_trip_reports_the_verdict() {
        let url = serve(create_router(StubDetector::new(DetectorPolicy::Always))).await;
        let client = WallDetectionClient::new(url, None);

        let verdict = client.analyze(scene(128)).await.unwrap();

        assert!(verdict.wall_detected);
    }

    #[tokio::test]
    async fn base64_encoding_reaches_the_same_verdict() {
        let url = serve(create_router(StubDetector::new(DetectorPolicy::Alternate))).await;
        let client =
            WallDetectionClient::new(url, None).with_encoding(PayloadEncoding::Base64Json);

        let first = client.analyze(scene(128)).await.unwrap();
        let second = client.analyze(scene(128)).await.unwrap();

        assert!(!first.wall_detected);
        assert!(second.wall_detected);
    }

    #[tokio::test]
    async fn unauthorized_is_a_transport_error() {
        let url = serve(create_router_with_auth(
            StubDetector::new(DetectorPolicy::Always),
            DetectorAuth::with_api_key("secret"),
        ))
        .await;
        let client = WallDetectionClient::new(url, Some("wrong".into()));

        let err = client.analyze(scene(128)).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Transport(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = WallDetectionClient::new(format!("http://{}/detect-wall", addr), None);

        let err = client.analyze(scene(128)).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Transport(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let router = axum::Router::new().route(
            "/detect-wall",
            axum::routing::post(|| async { "wall? maybe" }),
        );
        let url = serve(router).await;
        let client = WallDetectionClient::new(url, None);

        let err = client.analyze(scene(128)).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Malformed(_)));
    }
}
