//! Integration tests for the pose-binder HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use pose_binder::backend::AZURE_KINECT;
    use pose_binder::core::{create_shared_engine, lock_engine, CompareSettings, PoseEngine};
    use pose_binder::core::types::{Confidence, SkeletonFrame};
    use pose_binder::server::{run, ServerConfig, ServerState};
    use pose_binder::{create_shared_stats, SharedEngine};
    use std::time::Duration;

    fn test_engine() -> SharedEngine {
        create_shared_engine(PoseEngine::new(
            &AZURE_KINECT,
            CompareSettings::all_joints(AZURE_KINECT.joint_count()),
            30,
        ))
    }

    async fn start(engine: SharedEngine) -> (String, tokio::sync::oneshot::Sender<()>) {
        let state = ServerState::new(engine, create_shared_stats());
        let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (format!("http://{}", addr), shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (base, shutdown_tx) = start(test_engine()).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/health", base))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_status_and_frame() {
        let engine = test_engine();
        let (base, shutdown_tx) = start(engine.clone()).await;
        let client = reqwest::Client::new();

        // No frame tracked yet
        let response = client
            .get(format!("{}/frame", base))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 404);

        {
            let mut engine = lock_engine(&engine);
            for _ in 0..31 {
                engine.ingest(SkeletonFrame::uniform(
                    32,
                    [1.0, 0.0, 0.0, 0.0],
                    Confidence::High,
                ));
            }
        }

        let frame: serde_json::Value = client
            .get(format!("{}/frame", base))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(frame["vertices"].as_array().map(|v| v.len()), Some(32));
        assert_eq!(frame["status"]["state"], "matched");

        let status: serde_json::Value = client
            .get(format!("{}/status", base))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["engine"]["state"], "locked");
        assert_eq!(status["engine"]["mode"], "record");
        assert_eq!(status["engine"]["feed_stopped"], false);
        assert!(status["session"]["session_id"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_command_endpoint() {
        let engine = test_engine();
        let (base, shutdown_tx) = start(engine.clone()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/command", base))
            .json(&serde_json::json!({ "command": "threshold 0.5" }))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert_eq!(lock_engine(&engine).settings().threshold, 0.5);

        // Unknown command
        let response = client
            .post(format!("{}/command", base))
            .json(&serde_json::json!({ "command": "jump" }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_COMMAND");

        // Saving with nothing locked fails without touching the library
        let response = client
            .post(format!("{}/command", base))
            .json(&serde_json::json!({ "command": "bind 65" }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status().as_u16(), 422);
        assert_eq!(lock_engine(&engine).library().len(), 0);

        let _ = shutdown_tx.send(());
    }
}
