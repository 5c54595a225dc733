//! Trajectory - 分段三次 Hermite 轨迹
//!
//! 相邻两个路点之间用三次多项式插值，两端位置和速度都取自路点：
//!
//! ```text
//! p(s) = a0 + a1*s + a2*s² + a3*s³,  s = (t - t0) / T ∈ [0, 1]
//! ```
//!
//! 其中 `T` 为段时长。速度边界条件以归一化时间表示（乘以 `T`），
//! 求导后再除以 `T` 得到物理速度。
//!
//! # 查找
//!
//! 执行时时间单调前进，[`SegmentCursor`] 只向前扫描，不回退。
//!
//! # 示例
//!
//! ```
//! use urlink_client::{Trajectory, Waypoint};
//!
//! let trajectory = Trajectory::new(vec![
//!     Waypoint::at_rest(0.0, [0.0; 6]),
//!     Waypoint::at_rest(2.0, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
//! ])
//! .unwrap();
//!
//! let mut cursor = trajectory.cursor();
//! let q = trajectory.sample(&mut cursor, 1.0);
//! assert!((q[0] - 0.5).abs() < 1e-12);
//! ```

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use urlink_protocol::{JOINT_COUNT, JointVector};

/// 三次多项式系数
///
/// 表示 `p(s) = a0 + a1*s + a2*s² + a3*s³`
#[derive(Debug, Clone, Copy, PartialEq)]
struct CubicCoeffs {
    a0: f64,
    a1: f64,
    a2: f64,
    a3: f64,
}

impl CubicCoeffs {
    /// Hermite 边界条件：`p(0) = p0`, `p(1) = p1`,
    /// 物理速度 `v0`/`v1` 按段时长 `duration` 缩放到归一化时间
    fn hermite(p0: f64, v0: f64, p1: f64, v1: f64, duration: f64) -> Self {
        let m0 = v0 * duration;
        let m1 = v1 * duration;
        Self {
            a0: p0,
            a1: m0,
            a2: 3.0 * (p1 - p0) - 2.0 * m0 - m1,
            a3: -2.0 * (p1 - p0) + m0 + m1,
        }
    }

    fn position(&self, s: f64) -> f64 {
        self.a0 + self.a1 * s + self.a2 * s * s + self.a3 * s * s * s
    }

    /// 对归一化时间的导数
    fn velocity(&self, s: f64) -> f64 {
        self.a1 + 2.0 * self.a2 * s + 3.0 * self.a3 * s * s
    }
}

/// 轨迹路点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// 相对轨迹起点的时间（秒）
    pub time: f64,
    /// 关节角（rad）
    pub positions: JointVector,
    /// 关节速度（rad/s），文件中缺省为 0
    #[serde(default)]
    pub velocities: JointVector,
}

impl Waypoint {
    pub fn new(time: f64, positions: JointVector, velocities: JointVector) -> Self {
        Self {
            time,
            positions,
            velocities,
        }
    }

    /// 速度为零的路点
    pub fn at_rest(time: f64, positions: JointVector) -> Self {
        Self::new(time, positions, [0.0; JOINT_COUNT])
    }
}

/// 路点文件格式
///
/// ```toml
/// [[waypoint]]
/// time = 0.0
/// positions = [0.0, -1.57, 0.0, -1.57, 0.0, 0.0]
///
/// [[waypoint]]
/// time = 2.0
/// positions = [0.5, -1.57, 0.0, -1.57, 0.0, 0.0]
/// velocities = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrajectoryFile {
    waypoint: Vec<Waypoint>,
}

/// 只向前移动的段游标
///
/// `index` 指向当前段的终点路点，从 1 开始。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCursor {
    index: usize,
}

impl SegmentCursor {
    /// 当前段终点路点的下标
    pub fn index(&self) -> usize {
        self.index
    }

    fn advance(&mut self, waypoints: &[Waypoint], t: f64) {
        let last = waypoints.len() - 1;
        while self.index < last && waypoints[self.index].time <= t {
            self.index += 1;
        }
    }
}

/// 经过校验的轨迹
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    waypoints: Vec<Waypoint>,
}

impl Trajectory {
    /// 校验并构造轨迹
    ///
    /// # 错误
    /// - `ClientError::InvalidTrajectory`: 少于两个路点、时间为负或递减、含非有限值
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, ClientError> {
        if waypoints.len() < 2 {
            return Err(ClientError::InvalidTrajectory(format!(
                "need at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        if waypoints[0].time < 0.0 {
            return Err(ClientError::InvalidTrajectory(format!(
                "first timestamp {} is negative",
                waypoints[0].time
            )));
        }
        for (i, w) in waypoints.iter().enumerate() {
            let finite = w.time.is_finite()
                && w.positions.iter().all(|v| v.is_finite())
                && w.velocities.iter().all(|v| v.is_finite());
            if !finite {
                return Err(ClientError::InvalidTrajectory(format!(
                    "waypoint {i} contains a non-finite value"
                )));
            }
        }
        if let Some(i) = waypoints.windows(2).position(|w| w[1].time < w[0].time) {
            return Err(ClientError::InvalidTrajectory(format!(
                "timestamp {} at index {} is earlier than {}",
                waypoints[i + 1].time,
                i + 1,
                waypoints[i].time
            )));
        }
        Ok(Self { waypoints })
    }

    /// 从按列给出的时间戳 / 位置 / 速度构造
    ///
    /// # 参数
    /// - `timestamps`: 各路点时间（秒）
    /// - `positions`: 各路点关节角，每项必须恰好 6 个元素
    /// - `velocities`: 各路点关节速度，每项必须恰好 6 个元素
    pub fn from_columns(
        timestamps: &[f64],
        positions: &[Vec<f64>],
        velocities: &[Vec<f64>],
    ) -> Result<Self, ClientError> {
        if timestamps.len() != positions.len() || timestamps.len() != velocities.len() {
            return Err(ClientError::InvalidTrajectory(format!(
                "length mismatch: {} timestamps, {} positions, {} velocities",
                timestamps.len(),
                positions.len(),
                velocities.len()
            )));
        }
        let waypoints = timestamps
            .iter()
            .zip(positions.iter().zip(velocities))
            .enumerate()
            .map(|(i, (&time, (q, qd)))| {
                Ok(Waypoint::new(time, joint_vector(q, i)?, joint_vector(qd, i)?))
            })
            .collect::<Result<Vec<_>, ClientError>>()?;
        Self::new(waypoints)
    }

    /// 从 TOML 路点文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let content = fs::read_to_string(path)?;
        let file: TrajectoryFile = toml::from_str(&content)?;
        Self::new(file.waypoint)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// 最后一个路点的时间（秒）
    pub fn duration(&self) -> f64 {
        self.waypoints[self.waypoints.len() - 1].time
    }

    pub fn cursor(&self) -> SegmentCursor {
        SegmentCursor { index: 1 }
    }

    /// 在时间 `t` 处的关节角
    ///
    /// 游标只前进；`t` 超出末路点时返回末段在 `T` 处的值（即末路点位置）。
    pub fn sample(&self, cursor: &mut SegmentCursor, t: f64) -> JointVector {
        self.evaluate(cursor, t).0
    }

    /// 在时间 `t` 处的关节角和关节速度
    pub fn evaluate(&self, cursor: &mut SegmentCursor, t: f64) -> (JointVector, JointVector) {
        cursor.advance(&self.waypoints, t);
        let start = &self.waypoints[cursor.index - 1];
        let end = &self.waypoints[cursor.index];
        let duration = end.time - start.time;

        if duration <= 0.0 {
            return (end.positions, end.velocities);
        }

        let s = (t - start.time).clamp(0.0, duration) / duration;
        let mut positions = [0.0; JOINT_COUNT];
        let mut velocities = [0.0; JOINT_COUNT];
        for j in 0..JOINT_COUNT {
            let coeffs = CubicCoeffs::hermite(
                start.positions[j],
                start.velocities[j],
                end.positions[j],
                end.velocities[j],
                duration,
            );
            positions[j] = coeffs.position(s);
            velocities[j] = coeffs.velocity(s) / duration;
        }
        (positions, velocities)
    }

    /// 按固定周期采样整条轨迹
    pub fn samples(&self, period: f64) -> Samples<'_> {
        Samples {
            trajectory: self,
            cursor: self.cursor(),
            period,
            index: 0,
        }
    }
}

fn joint_vector(values: &[f64], index: usize) -> Result<JointVector, ClientError> {
    values.try_into().map_err(|_| {
        ClientError::InvalidTrajectory(format!(
            "waypoint {index} has {} joints, expected {JOINT_COUNT}",
            values.len()
        ))
    })
}

/// 固定周期采样迭代器，产出 `(t, positions)`
pub struct Samples<'a> {
    trajectory: &'a Trajectory,
    cursor: SegmentCursor,
    period: f64,
    index: usize,
}

impl Iterator for Samples<'_> {
    type Item = (f64, JointVector);

    fn next(&mut self) -> Option<Self::Item> {
        if self.period.is_nan() || self.period <= 0.0 {
            return None;
        }
        let t = self.index as f64 * self.period;
        if t > self.trajectory.duration() {
            return None;
        }
        self.index += 1;
        Some((t, self.trajectory.sample(&mut self.cursor, t)))
    }
}
