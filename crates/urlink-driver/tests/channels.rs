//! 配置通道 / 实时通道的回环集成测试

use std::time::{Duration, Instant};
use urlink_driver::{
    ChannelConfig, ConfigChannel, ConnectionState, DriverError, RealtimeChannel, query_version,
};
use urlink_protocol::{Capabilities, ProtocolVersion, RealtimeLayout, RealtimeState};
use urlink_testkit::{FakeController, FakeControllerConfig, count_zero_speed};

fn config_for(fake: &FakeController) -> ChannelConfig {
    ChannelConfig {
        host: fake.host().to_string(),
        primary_port: fake.primary_port(),
        secondary_port: fake.secondary_port(),
        realtime_port: fake.realtime_port(),
        connect_timeout_ms: 2000,
        poll_timeout_ms: 100,
        handshake_settle_ms: 10,
        ..Default::default()
    }
}

fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn manual_fake() -> FakeController {
    FakeController::start(FakeControllerConfig {
        realtime_period: None,
        ..Default::default()
    })
}

#[test]
fn test_query_reports_version() {
    let fake = FakeController::with_version(3, 2);
    let version = query_version(&config_for(&fake)).unwrap();
    assert_eq!((version.major, version.minor), (3, 2));
}

#[test]
fn test_query_rejects_major_one() {
    let fake = FakeController::with_version(1, 8);
    let err = ConfigChannel::connect(&config_for(&fake)).err().unwrap();
    assert!(matches!(err, DriverError::UnsupportedVersion(_)));
    assert!(err.to_string().contains("unsupported firmware version"));
}

#[test]
fn test_config_channel_updates_snapshot_and_signals() {
    let fake = FakeController::with_version(3, 1);
    let channel = ConfigChannel::connect(&config_for(&fake)).unwrap();
    assert_eq!(channel.version().minor, 1);
    assert_eq!(channel.connection_state(), ConnectionState::Streaming);

    let signal = &channel.context().signal;
    let seq = signal.wait_timeout(0, Duration::from_secs(2));
    assert!(seq > 0);
    let snapshot = channel.snapshot();
    assert!(snapshot.is_ready());
    assert!(snapshot.robot_mode.is_power_on_robot);

    fake.set_robot_mode(|m| m.is_protective_stopped = true);
    assert!(wait_for(Duration::from_secs(2), || channel.snapshot().is_protective_stopped()));
    assert!(channel.metrics().frames_decoded >= 2);
}

#[test]
fn test_config_channel_script_upload_and_halt() {
    let fake = FakeController::with_version(3, 0);
    let config = config_for(&fake);
    let channel = ConfigChannel::connect(&config).unwrap();
    channel.send_script("def prog():\n\ttextmsg(\"hi\")\nend\n").unwrap();
    assert!(fake.wait_until(Duration::from_secs(2), |f| f.script_text().contains("textmsg")));

    let start = Instant::now();
    channel.halt();
    assert!(start.elapsed() < config.poll_timeout() * 3);
    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert!(!channel.snapshot().robot_mode.is_robot_connected);
    assert!(matches!(
        channel.send_script("x\n"),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_realtime_frames_decoded_and_published() {
    let fake = FakeController::with_version(3, 1);
    fake.set_realtime_state(|s| s.q_actual = [0.1, -0.2, 0.3, -0.4, 0.5, -0.6]);
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();
    let mut reader = channel.take_reader().unwrap();
    assert!(channel.take_reader().is_none());

    assert!(wait_for(Duration::from_secs(2), || reader.swap_front()));
    assert_eq!(reader.front().q_actual, [0.1, -0.2, 0.3, -0.4, 0.5, -0.6]);
    assert_eq!(channel.latest().q_actual[5], -0.6);
    assert_eq!(channel.local_ip().to_string(), "127.0.0.1");
}

#[test]
fn test_wrong_length_frame_dropped_without_state_change() {
    let fake = manual_fake();
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();

    // 3.2 长度的帧发给 3.1 通道
    let v32 = RealtimeLayout::for_version(ProtocolVersion::new(3, 2)).unwrap();
    let mut wrong = bytes::BytesMut::new();
    RealtimeState {
        q_actual: [9.0; 6],
        ..Default::default()
    }
    .pack_to(&mut wrong, &v32);
    fake.push_raw_realtime(wrong.to_vec());

    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_dropped == 1));
    assert_eq!(channel.metrics().frames_decoded, 0);
    assert_eq!(channel.latest().q_actual, [0.0; 6]);

    fake.set_realtime_state(|s| s.q_actual = [1.0; 6]);
    fake.push_realtime_frames(1);
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded == 1));
    assert_eq!(channel.latest().q_actual, [1.0; 6]);
    assert_eq!(channel.connection_state(), ConnectionState::Streaming);
}

#[test]
fn test_watchdog_stops_after_max_frames_without_command() {
    let fake = manual_fake();
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();

    channel.set_speed(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0], 100.0).unwrap();
    fake.push_realtime_frames(12);
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded == 12));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(count_zero_speed(&fake.command_text()), 0);

    fake.push_realtime_frames(1);
    assert!(fake.wait_until(Duration::from_secs(2), |f| count_zero_speed(&f.command_text()) == 1));
    assert_eq!(channel.metrics().watchdog_trips, 1);

    // 不再重复触发
    fake.push_realtime_frames(5);
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded == 18));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(count_zero_speed(&fake.command_text()), 1);

    // 非零速度重新计数
    channel.set_speed(&[0.0, 0.2, 0.0, 0.0, 0.0, 0.0], 100.0).unwrap();
    assert_eq!(channel.context().watchdog.count(), 0);
    fake.push_realtime_frames(13);
    assert!(fake.wait_until(Duration::from_secs(2), |f| count_zero_speed(&f.command_text()) == 2));
}

#[test]
fn test_zero_speed_command_does_not_reset_watchdog() {
    let fake = manual_fake();
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();
    channel.set_safety_count_max(2);

    fake.push_realtime_frames(2);
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded == 2));
    channel.set_speed(&[0.0; 6], 100.0).unwrap();
    assert_eq!(channel.context().watchdog.count(), 2);
}

#[test]
fn test_failed_speed_command_keeps_watchdog_count() {
    let fake = manual_fake();
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();

    fake.push_realtime_frames(3);
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded == 3));
    assert_eq!(channel.context().watchdog.count(), 3);

    channel.halt();
    assert!(matches!(
        channel.set_speed(&[0.3, 0.0, 0.0, 0.0, 0.0, 0.0], 100.0),
        Err(DriverError::NotConnected)
    ));
    assert_eq!(channel.context().watchdog.count(), 3);
}

#[test]
fn test_halt_sends_final_zero_speed() {
    let fake = FakeController::with_version(3, 0);
    let config = config_for(&fake);
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config, caps).unwrap();
    channel.send_command("textmsg(\"ping\")").unwrap();
    assert!(fake.wait_until(Duration::from_secs(2), |f| f.command_text().contains("textmsg(\"ping\")\n")));

    let before = count_zero_speed(&fake.command_text());
    let start = Instant::now();
    channel.halt();
    assert!(start.elapsed() < config.poll_timeout() * 3);
    assert!(fake.wait_until(Duration::from_secs(2), |f| count_zero_speed(&f.command_text()) > before));
    // 3.0 的速度命令带时间参数
    assert!(fake.command_text().contains(", 100.000000, 0.02)\n"));
    assert!(matches!(
        channel.send_command("stopj(10)"),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_controller_disconnect_moves_to_disconnected() {
    let fake = FakeController::with_version(3, 1);
    let caps = Capabilities::for_version(fake.version());
    let channel = RealtimeChannel::connect(&config_for(&fake), caps).unwrap();
    assert!(wait_for(Duration::from_secs(2), || channel.metrics().frames_decoded > 0));

    fake.drop_realtime_connection();
    assert!(wait_for(Duration::from_secs(2), || {
        channel.connection_state() == ConnectionState::Disconnected
    }));
}
