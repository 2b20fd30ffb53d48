// ==========================================
// 固化罐装载分配系统 - 精确排布（限时分支定界）
// ==========================================
// 模型: 每件 = 入罐标志 + 层 + 朝向 + 坐标
// 坐标取自正规模式集（工装外形加间隙的可达和 + 留边），搜索完备
// 目标: 入罐数量 × 1000 − 各层包络面积占比之和
// 剪枝: 数量上界 / 包络单调 / 同型工装对称性
// 预算到期: 丢弃搜索栈，仅返回已完成的最优解
// ==========================================

use super::geometry::{Layout, Mm, PackItem, PackState, Rect};
use crate::domain::types::Level;
use std::time::Instant;
use tracing::debug;

const PENALTY_EPS: f64 = 1e-9;
// 每隔多少次位置试探检查一次截止时间
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// 完整可行解
#[derive(Debug, Clone)]
pub(crate) struct Solution {
    pub state: PackState,
    pub count: usize,
    pub penalty: f64,
}

impl Solution {
    fn improves_on(&self, count: usize, penalty: f64) -> bool {
        self.count > count || (self.count == count && self.penalty < penalty - PENALTY_EPS)
    }
}

#[derive(Debug)]
pub(crate) enum ExactOutcome {
    /// 搜索完成；Some 为严格优于下界的最优解，None 表示下界即最优
    Completed(Option<Solution>),
    /// 预算到期；Some 为到期前找到的严格更优解
    TimedOut(Option<Solution>),
}

struct Timeout;

/// 单层单轴的正规模式坐标
#[derive(Debug, Clone)]
struct AxisPatterns {
    level: Level,
    xs: Vec<Mm>,
    ys: Vec<Mm>,
}

pub(crate) struct ExactSolver<'a> {
    layout: &'a Layout,
    items: &'a [PackItem],
    twin_of_prev: Vec<bool>,
    patterns: Vec<AxisPatterns>,
    deadline: Instant,
    ticks: u64,
    best_count: usize,
    best_penalty: f64,
    incumbent: Option<Solution>,
}

impl<'a> ExactSolver<'a> {
    /// # 参数
    /// - `items`: 已按面积降序排好
    /// - `lower_bound`: 已知可行解 (数量, 包络)，只接受严格更优的解
    pub fn new(
        layout: &'a Layout,
        items: &'a [PackItem],
        deadline: Instant,
        lower_bound: Option<(usize, f64)>,
    ) -> Self {
        let twin_of_prev = (0..items.len())
            .map(|i| i > 0 && items[i].is_twin_of(&items[i - 1]))
            .collect();

        let patterns = layout
            .surfaces
            .iter()
            .map(|s| AxisPatterns {
                level: s.level,
                xs: normal_patterns(items, layout.gap, s.inner_width(), true)
                    .into_iter()
                    .map(|v| s.x_min + v)
                    .collect(),
                ys: normal_patterns(items, layout.gap, s.inner_length(), false)
                    .into_iter()
                    .map(|v| s.y_min + v)
                    .collect(),
            })
            .collect();

        let (best_count, best_penalty) = lower_bound.unwrap_or((0, f64::INFINITY));
        Self {
            layout,
            items,
            twin_of_prev,
            patterns,
            deadline,
            ticks: 0,
            best_count,
            best_penalty,
            incumbent: None,
        }
    }

    pub fn solve(mut self) -> ExactOutcome {
        let mut state = PackState::default();
        let result = self.search(0, &mut state);
        debug!(nodes = self.ticks, completed = result.is_ok(), "精确搜索结束");
        match result {
            Ok(()) => ExactOutcome::Completed(self.incumbent),
            // 搜索栈随 state 一起丢弃
            Err(Timeout) => ExactOutcome::TimedOut(self.incumbent),
        }
    }

    fn tick(&mut self) -> Result<(), Timeout> {
        self.ticks += 1;
        if self.ticks % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(Timeout);
        }
        Ok(())
    }

    fn record(&mut self, state: &PackState) {
        let count = state.count();
        let penalty = state.extent_penalty(self.layout);
        let candidate = Solution {
            state: state.clone(),
            count,
            penalty,
        };
        if candidate.improves_on(self.best_count, self.best_penalty) {
            self.best_count = count;
            self.best_penalty = penalty;
            self.incumbent = Some(candidate);
        }
    }

    fn search(&mut self, depth: usize, state: &mut PackState) -> Result<(), Timeout> {
        self.tick()?;
        // 任一节点本身就是一个完整解（其余件不入罐）
        self.record(state);
        if depth == self.items.len() {
            return Ok(());
        }

        let upper = state.count() + self.remaining_upper_bound(depth, state);
        if upper < self.best_count {
            return Ok(());
        }
        if upper == self.best_count
            && state.extent_penalty(self.layout) >= self.best_penalty - PENALTY_EPS
        {
            return Ok(());
        }

        let items = self.items;
        let item = &items[depth];
        let twin = self.twin_of_prev[depth];
        // 同型前件未入罐则本件也不入罐；入罐则位置须在前件之后
        let prev_key = if twin {
            state.rect_of(depth - 1).map(|r| Some(r.order_key()))
        } else {
            Some(None)
        };

        if let Some(prev_key) = prev_key {
            if state.admits(self.layout, item).is_ok() {
                for p in 0..self.patterns.len() {
                    let level = self.patterns[p].level;
                    if state.admits_on(self.layout, item, level).is_err() {
                        continue;
                    }
                    let Some(surface) = self.layout.surface(level).copied() else {
                        continue;
                    };
                    for &rotated in item.orientations() {
                        let (w, h) = item.extent(rotated);
                        for yi in 0..self.patterns[p].ys.len() {
                            let y = self.patterns[p].ys[yi];
                            if y + h > surface.y_max {
                                break;
                            }
                            for xi in 0..self.patterns[p].xs.len() {
                                let x = self.patterns[p].xs[xi];
                                if x + w > surface.x_max {
                                    break;
                                }
                                self.tick()?;
                                let rect = Rect {
                                    item: depth,
                                    level,
                                    x,
                                    y,
                                    w,
                                    h,
                                    rotated,
                                };
                                if let Some(key) = prev_key {
                                    if rect.order_key() <= key {
                                        continue;
                                    }
                                }
                                if !state.fits(self.layout, &surface, &rect) {
                                    continue;
                                }
                                state.push(rect, item);
                                let result = self.search(depth + 1, state);
                                state.pop(item);
                                result?;
                            }
                        }
                    }
                }
            }
        }

        // 本件不入罐
        self.search(depth + 1, state)
    }

    /// 剩余件最多还能入罐几件（重量 / 接口 / 面积各自取最小件累加）
    fn remaining_upper_bound(&self, depth: usize, state: &PackState) -> usize {
        let rest = &self.items[depth..];
        if rest.is_empty() {
            return 0;
        }

        let weight_left = self.layout.weight_limit_kg - state.weight_kg;
        let connectors_left = self.layout.connector_cap.saturating_sub(state.connectors) as f64;
        let used_area: f64 = state
            .rects
            .iter()
            .map(|r| (r.w * r.h) as f64)
            .sum();
        let total_area: f64 = self
            .layout
            .surfaces
            .iter()
            .map(|s| (s.inner_width() * s.inner_length()) as f64)
            .sum();
        let area_left = total_area - used_area;

        let by_weight = count_within(rest.iter().map(|i| i.weight_kg), weight_left);
        let by_connectors = count_within(rest.iter().map(|i| i.connectors as f64), connectors_left);
        let by_area = count_within(rest.iter().map(|i| (i.w * i.h) as f64), area_left);
        rest.len().min(by_weight).min(by_connectors).min(by_area)
    }
}

/// 从小到大累加，不超过容量的件数
fn count_within(values: impl Iterator<Item = f64>, capacity: f64) -> usize {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut sum = 0.0;
    let mut count = 0;
    for v in sorted {
        sum += v;
        if sum > capacity + 1e-9 {
            break;
        }
        count += 1;
    }
    count
}

/// 正规模式: 若干工装在该轴上的外形（含间隙）之和的全部可达值
fn normal_patterns(items: &[PackItem], gap: Mm, limit: Mm, x_axis: bool) -> Vec<Mm> {
    if limit < 0 {
        return Vec::new();
    }
    let size = limit as usize + 1;
    let mut reachable = vec![false; size];
    reachable[0] = true;

    for item in items {
        let extents: Vec<Mm> = item
            .orientations()
            .iter()
            .map(|&rotated| {
                let (w, h) = item.extent(rotated);
                if x_axis {
                    w
                } else {
                    h
                }
            })
            .collect();
        let snapshot = reachable.clone();
        for (s, _) in snapshot.iter().enumerate().filter(|(_, r)| **r) {
            for &e in &extents {
                let next = s + (e + gap).max(0) as usize;
                if next < size {
                    reachable[next] = true;
                }
            }
        }
    }

    reachable
        .iter()
        .enumerate()
        .filter(|(_, r)| **r)
        .map(|(s, _)| s as Mm)
        .collect()
}
