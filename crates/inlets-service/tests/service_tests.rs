use inlets_service::{
    ControlKind, ControlLoopSettings, ControlRequest, EventLevel, HostChannel, MemoryEventSink,
    PlatformSupervisorFactory, ServiceBridge, ServiceConfig, ServiceError, ServiceMode,
    ServiceRunner, ServiceState, control_channel,
};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

fn tunnel_config() -> ServiceConfig {
    load_config(
        r#"{
            "Upstreams": ["a", "b"],
            "URL": "https://x",
            "Token": "t",
            "LicenseFile": "lic.txt",
            "AutoTLS": true
        }"#,
    )
}

fn load_config(raw: &str) -> ServiceConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inlets.json");
    std::fs::write(&path, raw).unwrap();
    ServiceConfig::load(&path).unwrap()
}

fn quick_settings() -> ControlLoopSettings {
    ControlLoopSettings::builder()
        .fast_tick(Duration::from_millis(20))
        .slow_tick(Duration::from_millis(50))
        .interrogate_delay(Duration::ZERO)
        .build()
        .unwrap()
}

async fn wait_for(sink: &MemoryEventSink, level: EventLevel, needle: &str) -> bool {
    for _ in 0..100 {
        if sink.messages_at(level).iter().any(|m| m == needle) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Drives a stand-in tunnel client through a full pause/interrogate/continue/stop cycle.
#[cfg(unix)]
#[tokio::test]
async fn test_supervised_client_lifecycle() {
    use std::os::unix::fs::PermissionsExt;

    init_tracing();

    let dir = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap();
    let script = dir.path().join("inlets-pro");
    std::fs::write(&script, "#!/bin/sh\necho \"$@\"\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let sink = Arc::new(MemoryEventSink::new());
    let supervisor = PlatformSupervisorFactory::create_supervisor(sink.clone());
    let runner = ServiceRunner::new("inlets", tunnel_config(), supervisor, sink.clone())
        .with_executable(script.to_string_lossy())
        .with_settings(quick_settings())
        .start()
        .await;
    assert!(runner.has_child());

    assert!(
        wait_for(
            &sink,
            EventLevel::Info,
            "[inlets-pro] http client --url=https://x --upstream=a,b --token=t \
             --license-file=lic.txt --auto-tls=true",
        )
        .await
    );

    let (host, service) = control_channel();
    let HostChannel {
        requests,
        mut status,
    } = host;
    for request in [
        ControlRequest::new(ControlKind::Pause),
        ControlRequest::new(ControlKind::Interrogate),
        ControlRequest::new(ControlKind::Continue),
        ControlRequest::with_context(ControlKind::Stop, 7),
    ] {
        requests.send(request).unwrap();
    }

    let exit_code = tokio::time::timeout(
        Duration::from_secs(10),
        runner.execute(&["inlets".to_string()], service),
    )
    .await
    .unwrap();
    assert_eq!(exit_code, 0);

    let mut states = Vec::new();
    while let Ok(next) = status.try_recv() {
        states.push(next.state);
    }
    assert_eq!(
        states,
        vec![
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::Paused,
            ServiceState::Paused,
            ServiceState::Paused,
            ServiceState::Running,
            ServiceState::StopPending,
        ]
    );

    let info = sink.messages_at(EventLevel::Info);
    assert!(info.iter().any(|m| m.ends_with("--token=*** --license-file=lic.txt --auto-tls=true")));
    assert!(info.contains(&"inlets-7".to_string()));
    assert!(sink.messages_at(EventLevel::Warning).is_empty());
}

#[tokio::test]
async fn test_missing_client_still_reaches_running() {
    init_tracing();

    let sink = Arc::new(MemoryEventSink::new());
    let supervisor = PlatformSupervisorFactory::create_supervisor(sink.clone());
    let runner = ServiceRunner::new("inlets", tunnel_config(), supervisor, sink.clone())
        .with_executable("/nonexistent/inlets-pro")
        .with_settings(quick_settings())
        .start()
        .await;
    assert!(!runner.has_child());

    let errors = sink.messages_at(EventLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error starting app"));

    let (host, service) = control_channel();
    let HostChannel {
        requests,
        mut status,
    } = host;
    requests.send(ControlRequest::new(ControlKind::Shutdown)).unwrap();

    runner.execute(&["inlets".to_string()], service).await;

    let mut states = Vec::new();
    while let Ok(next) = status.try_recv() {
        states.push(next.state);
    }
    assert_eq!(
        states,
        vec![
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::StopPending,
        ]
    );
}

#[test]
fn test_bridge_rejects_incomplete_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inlets.json");
    std::fs::write(
        &path,
        r#"{"upstreams": [], "url": "https://x", "token": "t", "license-file": "", "auto-tls": false}"#,
    )
    .unwrap();

    let sink = Arc::new(MemoryEventSink::new());
    let err = ServiceBridge::new("inlets")
        .with_config_path(&path)
        .with_sink(sink.clone())
        .run(ServiceMode::Debug)
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, ServiceError::ConfigLoad(_)));
    assert_eq!(
        sink.messages_at(EventLevel::Error),
        vec!["inlets service failed: invalid configuration: at least one upstream is required"]
    );
}
