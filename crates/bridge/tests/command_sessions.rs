#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use atmo_bridge::BridgeError;
use common::MockHelper;

/// Helper answering the ready handshake and an `ok` line per request.
const ECHO_SESSION: &str = r#"
echo $$ >> $PIDFILE
echo '{"status":"ready"}'
while read line; do
	case "$line" in
		*'"type":"close"'*) exit 0 ;;
		*'"type":"power"'*) echo '{"status":"ok","power_state":"on"}' ;;
		*) echo '{"status":"ok"}' ;;
	esac
done
"#;

#[tokio::test]
async fn command_session_is_reused_across_requests() {
	let helper = MockHelper::new(ECHO_SESSION);
	let bridge = helper.bridge();

	let response = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	assert_eq!(response.status, "ok");
	assert_eq!(response.command, "select");
	assert_eq!(response.action, "SingleTap");
	assert_eq!(response.identifier.as_deref(), Some("AA:BB"));

	bridge
		.send_command("AA:BB", "menu", "SingleTap", false)
		.await
		.unwrap();

	assert!(bridge.has_command_session("AA:BB", false).await);
	assert_eq!(helper.pid_count(), 1);
}

#[tokio::test]
async fn power_round_trip() {
	let helper = MockHelper::new(ECHO_SESSION);
	let bridge = helper.bridge();

	let response = bridge.power("AA:BB", "status", false).await.unwrap();
	assert_eq!(response.power_state.as_deref(), Some("on"));
}

#[tokio::test]
async fn mock_and_real_sessions_are_independent() {
	let helper = MockHelper::new(ECHO_SESSION);
	let bridge = helper.bridge();

	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	bridge
		.send_command("AA:BB", "select", "SingleTap", true)
		.await
		.unwrap();

	assert!(bridge.has_command_session("AA:BB", false).await);
	assert!(bridge.has_command_session("AA:BB", true).await);
	assert_eq!(helper.pid_count(), 2);
}

#[tokio::test]
async fn error_response_keeps_session_alive() {
	let helper = MockHelper::new(
		r#"
echo $$ >> $PIDFILE
echo '{"status":"ready"}'
while read line; do
	case "$line" in
		*'"command":"up"'*) echo '{"status":"error","error":"device busy"}' ;;
		*) echo '{"status":"ok"}' ;;
	esac
done
"#,
	);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "up", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "device busy");

	// The failure was request-scoped; the same process answers the retry.
	assert!(bridge.has_command_session("AA:BB", false).await);
	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	assert_eq!(helper.pid_count(), 1);
}

#[tokio::test]
async fn fatal_response_tears_down_session() {
	let helper = MockHelper::new(
		r#"
echo $$ >> $PIDFILE
echo '{"status":"ready"}'
while read line; do
	echo '{"status":"error","error":"connection lost","fatal":true}'
done
"#,
	);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "connection lost");
	assert!(!bridge.has_command_session("AA:BB", false).await);

	// The next request starts over with a fresh process.
	let _ = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(helper.pid_count(), 2);
}

#[tokio::test]
async fn closing_status_tears_down_session() {
	let helper = MockHelper::new(
		r#"
echo '{"status":"ready"}'
read line
echo '{"status":"closing","message":"helper shutting down"}'
"#,
	);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "helper shutting down");
	assert!(!bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn handshake_failure_surfaces_reason() {
	let helper = MockHelper::new(r#"echo '{"status":"error","error":"no such device"}'"#);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "no such device");
	assert!(!bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn unexpected_exit_mid_request_fails_and_removes_session() {
	let helper = MockHelper::new(
		r#"
echo '{"status":"ready"}'
read line
exit 0
"#,
	);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "command session closed unexpectedly");
	assert!(!bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn concurrent_requests_on_one_session_are_rejected() {
	let helper = MockHelper::new(
		r#"
echo '{"status":"ready"}'
while read line; do
	sleep 1
	echo '{"status":"ok"}'
done
"#,
	);
	let bridge = Arc::new(helper.bridge());

	let (first, second) = tokio::join!(
		bridge.send_command("AA:BB", "select", "SingleTap", false),
		bridge.send_command("AA:BB", "menu", "SingleTap", false),
	);

	let results = [first, second];
	assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
	assert!(results.iter().any(|r| matches!(
		r,
		Err(BridgeError::ConcurrentReads)
	)));
}

#[tokio::test]
async fn benign_stderr_noise_is_ignored() {
	let helper = MockHelper::new(
		r#"
echo 'urllib3: NotOpenSSLWarning: compiled against LibreSSL' >&2
echo '{"status":"ready"}'
while read line; do
	echo '{"status":"ok"}'
done
"#,
	);
	let bridge = helper.bridge();

	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	assert!(bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn unexpected_stderr_fails_request_and_removes_session() {
	let helper = MockHelper::new(
		r#"
echo '{"status":"ready"}'
read line
echo 'Traceback: boom' >&2
sleep 5
"#,
	);
	let bridge = helper.bridge();

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert_eq!(err.to_string(), "Traceback: boom");
	assert!(!bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn idle_stderr_tears_down_session() {
	let helper = MockHelper::new(
		r#"
echo $$ >> $PIDFILE
echo '{"status":"ready"}'
read line
echo '{"status":"ok"}'
echo 'Traceback: boom' >&2
sleep 5
"#,
	);
	let bridge = helper.bridge();

	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();

	// Stderr arrives with no request in flight; the I/O task unregisters
	// the session on its own.
	for _ in 0..50 {
		if !bridge.has_command_session("AA:BB", false).await {
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert!(!bridge.has_command_session("AA:BB", false).await);

	// The next request starts a fresh helper instead of failing with the
	// stale error.
	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	assert_eq!(helper.pid_count(), 2);
}

#[tokio::test]
async fn response_timeout_closes_session() {
	let helper = MockHelper::new(
		r#"
echo '{"status":"ready"}'
read line
sleep 5
"#,
	);
	let bridge =
		helper.bridge_with(|config| config.with_response_timeout(Duration::from_millis(200)));

	let err = bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap_err();
	assert!(matches!(err, BridgeError::Timeout));
	assert!(!bridge.has_command_session("AA:BB", false).await);
}

#[tokio::test]
async fn unpair_closes_command_session_first() {
	let helper = MockHelper::new(
		r#"
case "$*" in
	*unpair*)
		echo '{"status":"ok","identifier":"AA:BB","protocol":"companion","credentials_removed":true}'
		;;
	*)
		echo $$ >> $PIDFILE
		echo '{"status":"ready"}'
		while read line; do
			case "$line" in
				*'"type":"close"'*) exit 0 ;;
				*) echo '{"status":"ok"}' ;;
			esac
		done
		;;
esac
"#,
	);
	let bridge = helper.bridge();

	bridge
		.send_command("AA:BB", "select", "SingleTap", false)
		.await
		.unwrap();
	assert!(bridge.has_command_session("AA:BB", false).await);

	let response = bridge.unpair("AA:BB", "companion", false).await.unwrap();
	assert!(response.credentials_removed);
	assert!(!bridge.has_command_session("AA:BB", false).await);
}
