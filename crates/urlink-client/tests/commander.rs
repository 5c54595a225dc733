//! Commander / RobotDriverFacade 的回环集成测试

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use urlink_client::{
    ClientError, Commander, CommanderConfig, RobotDriverFacade, Trajectory, TrajectoryOutcome,
    Waypoint,
};
use urlink_driver::{ChannelConfig, DriverError};
use urlink_testkit::{FakeController, parse_socket_open};

const Q_ACTUAL: [f64; 6] = [0.05, -1.0, 0.5, -0.5, 0.25, 0.0];

fn config_for(fake: &FakeController) -> CommanderConfig {
    CommanderConfig {
        channel: ChannelConfig {
            host: fake.host().to_string(),
            primary_port: fake.primary_port(),
            secondary_port: fake.secondary_port(),
            realtime_port: fake.realtime_port(),
            connect_timeout_ms: 2000,
            poll_timeout_ms: 100,
            handshake_settle_ms: 10,
            ..Default::default()
        },
        reverse_port: 0,
        accept_timeout_ms: 2000,
        ..Default::default()
    }
}

fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn connected(fake: &FakeController) -> Commander {
    fake.set_realtime_state(|s| s.q_actual = Q_ACTUAL);
    let commander = Commander::connect(&config_for(fake)).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        commander.realtime().latest().q_actual == Q_ACTUAL
    }));
    commander
}

fn ramp(duration: f64) -> Trajectory {
    Trajectory::new(vec![
        Waypoint::at_rest(0.0, [0.0; 6]),
        Waypoint::at_rest(duration, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ])
    .unwrap()
}

#[test]
fn test_trajectory_streams_setpoints_then_shuts_down() {
    let fake = FakeController::with_version(3, 1);
    let commander = connected(&fake);
    commander.set_servoj_time(0.001);
    commander.set_servoj_lookahead_time(0.5);
    commander.set_servoj_gain(5000.0);

    let outcome = commander
        .execute_trajectory(
            &[0.0, 0.2],
            &[vec![0.0; 6], vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
            &[vec![0.0; 6], vec![0.0; 6]],
        )
        .unwrap();
    assert_eq!(outcome, TrajectoryOutcome::Completed);
    assert!(!commander.is_executing());

    let script = fake.script_text();
    assert_eq!(
        parse_socket_open(&script),
        Some(("127.0.0.1".to_string(), commander.reverse_port()))
    );
    assert!(script.contains("servoj(q, t=0.0080, lookahead_time=0.2000, gain=2000)"));

    assert!(fake.wait_until(Duration::from_secs(2), |f| f.reverse_closed()));
    let setpoints = fake.setpoints();
    assert!(setpoints.len() > 10, "only {} setpoints", setpoints.len());

    let (last, streamed) = setpoints.split_last().unwrap();
    assert!(last.is_shutdown());
    for (got, want) in last.positions.iter().zip(Q_ACTUAL) {
        assert!((got - want).abs() < 1e-6);
    }

    assert!(streamed.iter().all(|s| s.keepalive == 1));
    assert!(streamed[0].positions[0] < 0.1);
    assert!(streamed.windows(2).all(|w| w[1].positions[0] >= w[0].positions[0] - 1e-6));
    assert!(streamed.iter().all(|s| s.positions[0] <= 1.0 + 1e-6));
    assert!(streamed.iter().all(|s| s.positions[1..].iter().all(|v| v.abs() < 1e-6)));
}

#[test]
fn test_stop_trajectory_preempts() {
    let fake = FakeController::with_version(3, 1);
    let commander = Arc::new(connected(&fake));

    let runner = {
        let commander = commander.clone();
        thread::spawn(move || commander.execute(&ramp(5.0)))
    };
    assert!(fake.wait_until(Duration::from_secs(2), |f| f.setpoints().len() >= 5));
    assert!(commander.is_executing());
    assert!(matches!(commander.execute(&ramp(1.0)), Err(ClientError::Busy)));

    let start = Instant::now();
    commander.stop_trajectory().unwrap();
    let outcome = runner.join().unwrap().unwrap();
    assert_eq!(outcome, TrajectoryOutcome::Preempted);
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(fake.wait_until(Duration::from_secs(2), |f| f.command_text().contains("stopj(10)\n")));
    assert!(fake.wait_until(Duration::from_secs(2), |f| f.reverse_closed()));
    assert!(fake.setpoints().last().unwrap().is_shutdown());
}

#[test]
fn test_missing_connect_back_is_an_error() {
    let fake = FakeController::with_version(3, 1);
    let mut config = config_for(&fake);
    config.accept_timeout_ms = 300;
    fake.set_realtime_state(|s| s.q_actual = Q_ACTUAL);
    let commander = Commander::connect(&config).unwrap();

    assert_eq!(commander.execute(&ramp(0.05)).unwrap(), TrajectoryOutcome::Completed);

    // 模拟控制器只回连一次
    let err = commander.execute(&ramp(0.05)).unwrap_err();
    assert!(matches!(err, ClientError::ReverseAccept { .. }));
    assert!(!commander.is_executing());
}

#[test]
fn test_halt_interrupts_pending_connect_back() {
    let fake = FakeController::with_version(3, 1);
    let mut config = config_for(&fake);
    config.accept_timeout_ms = 3000;
    fake.set_realtime_state(|s| s.q_actual = Q_ACTUAL);
    let commander = Arc::new(Commander::connect(&config).unwrap());
    assert_eq!(commander.execute(&ramp(0.05)).unwrap(), TrajectoryOutcome::Completed);

    // 模拟控制器不再回连，第二次执行停在等待回连上
    let worker = {
        let commander = commander.clone();
        thread::spawn(move || commander.execute(&ramp(0.05)))
    };
    assert!(wait_for(Duration::from_secs(2), || commander.is_executing()));
    thread::sleep(Duration::from_millis(200));

    let start = Instant::now();
    commander.halt();
    assert!(start.elapsed() < config.channel.poll_timeout() * 5);

    let outcome = worker.join().unwrap();
    assert_eq!(outcome.unwrap(), TrajectoryOutcome::Preempted);
    assert!(!commander.is_executing());
}

#[test]
fn test_servoj_without_reverse_connection_is_ignored() {
    let fake = FakeController::with_version(3, 1);
    let commander = connected(&fake);
    commander.servoj(&[0.1; 6], 1).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(fake.setpoints().is_empty());
    assert!(!fake.reverse_started());
}

#[test]
fn test_io_and_payload_commands() {
    let fake = FakeController::with_version(3, 1);
    let commander = connected(&fake);

    commander.set_digital_out(9, true).unwrap();
    commander.set_analog_out(1, 0.25).unwrap();
    commander.set_tool_voltage(24).unwrap();
    commander.set_flag(2, false).unwrap();
    assert!(!commander.set_payload(1.5).unwrap());
    assert!(!commander.set_payload(0.0).unwrap());
    assert!(commander.set_payload(0.5).unwrap());

    assert!(fake.wait_until(Duration::from_secs(2), |f| f.command_text().contains("set_payload(")));
    let text = fake.command_text();
    assert!(text.contains("sec setOut():\n\tset_configurable_digital_out(1, True)\nend\n"));
    assert!(text.contains("set_standard_analog_out(1, 0.2500)"));
    assert!(text.contains("set_tool_voltage(24)"));
    assert!(text.contains("set_flag(2, False)"));
    assert_eq!(text.matches("set_payload(").count(), 1);
    assert!(text.contains("set_payload(0.500)"));
    // 这些命令不走配置通道
    assert!(!fake.script_text().contains("setOut"));
}

#[test]
fn test_unsupported_firmware_is_fatal() {
    let fake = FakeController::with_version(1, 8);
    let err = Commander::connect(&config_for(&fake)).err().unwrap();
    assert!(matches!(
        err,
        ClientError::Driver(DriverError::UnsupportedVersion(_))
    ));
    assert!(err.to_string().contains("unsupported firmware version"));
}

#[test]
fn test_halt_is_idempotent_and_refuses_new_work() {
    let fake = FakeController::with_version(3, 1);
    let commander = connected(&fake);
    commander.halt();
    commander.halt();
    assert!(matches!(
        commander.execute(&ramp(0.05)),
        Err(ClientError::Driver(DriverError::NotConnected))
    ));
    assert!(commander.stop_trajectory().is_err());
}

#[test]
fn test_facade_publishes_corrected_pose() {
    let fake = FakeController::with_version(3, 1);
    fake.set_realtime_state(|s| {
        s.q_actual = [0.0, -FRAC_PI_2, 0.3, -FRAC_PI_2, 0.0, 0.1];
        s.tool_vector_actual = [0.4, 0.1, 0.2, 0.0, 0.0, 1.0];
    });
    let config = config_for(&fake);
    let facade = RobotDriverFacade::connect(&config).unwrap();

    let mut pose = None;
    assert!(wait_for(Duration::from_secs(2), || {
        if let Some(p) = facade.poll_pose() {
            pose = Some(p);
        }
        pose.as_ref().is_some_and(|p| p.angles[2] == 0.3)
    }));
    let pose = pose.unwrap();
    assert!(pose.angles[1].abs() < 1e-12);
    assert!(pose.angles[3].abs() < 1e-12);
    assert_eq!(pose.tool_position, [0.4, 0.1, 0.2]);
    assert_eq!(pose.tool_rotation, [0.0, 0.0, 1.0]);
    assert!(facade.pose_signal().sequence() > 0);
    let start = Instant::now();
    facade.halt();
    assert!(start.elapsed() < config.channel.poll_timeout() * 6);
    assert!(!facade.commander().realtime().connection_state().is_streaming());
}

#[test]
fn test_facade_requires_unclaimed_reader() {
    let fake = FakeController::with_version(3, 1);
    let config = config_for(&fake);
    let commander = Commander::connect(&config).unwrap();
    let _reader = commander.realtime().take_reader().unwrap();
    assert!(matches!(
        RobotDriverFacade::new(commander, config.channel.poll_timeout()),
        Err(ClientError::ReaderTaken)
    ));
}
