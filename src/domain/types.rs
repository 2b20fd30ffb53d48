// ==========================================
// 固化罐装载分配系统 - 领域类型定义
// ==========================================
// 状态字段统一为封闭枚举
// 持久化格式: SCREAMING_SNAKE_CASE，仅接受唯一规范拼写
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
// 车间流转: Preparing → InProgress → AwaitingCure → Curing → Done
// 本系统只推进 AwaitingCure → Curing → Done，其余为外部输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Preparing,    // 备料
    InProgress,   // 铺贴中
    AwaitingCure, // 待固化
    Curing,       // 固化中
    Done,         // 完成
}

impl WorkOrderStatus {
    /// 从数据库字符串解析（未知拼写返回 None）
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PREPARING" => Some(WorkOrderStatus::Preparing),
            "IN_PROGRESS" => Some(WorkOrderStatus::InProgress),
            "AWAITING_CURE" => Some(WorkOrderStatus::AwaitingCure),
            "CURING" => Some(WorkOrderStatus::Curing),
            "DONE" => Some(WorkOrderStatus::Done),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Preparing => "PREPARING",
            WorkOrderStatus::InProgress => "IN_PROGRESS",
            WorkOrderStatus::AwaitingCure => "AWAITING_CURE",
            WorkOrderStatus::Curing => "CURING",
            WorkOrderStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 固化罐状态 (Vessel Status)
// ==========================================
// Faulted / Off / Maintenance 由外部设备系统写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VesselStatus {
    Available,   // 空闲
    InUse,       // 占用（已预留或固化中）
    Faulted,     // 故障
    Off,         // 停机
    Maintenance, // 维护
}

impl VesselStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(VesselStatus::Available),
            "IN_USE" => Some(VesselStatus::InUse),
            "FAULTED" => Some(VesselStatus::Faulted),
            "OFF" => Some(VesselStatus::Off),
            "MAINTENANCE" => Some(VesselStatus::Maintenance),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            VesselStatus::Available => "AVAILABLE",
            VesselStatus::InUse => "IN_USE",
            VesselStatus::Faulted => "FAULTED",
            VesselStatus::Off => "OFF",
            VesselStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for VesselStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 分配方案状态 (Allocation Status)
// ==========================================
// 初始: Draft / Pending
// 终态: Completed / Cancelled
// Active 即"已确认"，只保留一种拼写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Draft,     // 草稿（未预留罐）
    Pending,   // 待确认（已预留罐）
    Active,    // 已确认（固化中）
    Cancelled, // 已取消
    Completed, // 已完成
}

impl AllocationStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(AllocationStatus::Draft),
            "PENDING" => Some(AllocationStatus::Pending),
            "ACTIVE" => Some(AllocationStatus::Active),
            "CANCELLED" => Some(AllocationStatus::Cancelled),
            "COMPLETED" => Some(AllocationStatus::Completed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AllocationStatus::Draft => "DRAFT",
            AllocationStatus::Pending => "PENDING",
            AllocationStatus::Active => "ACTIVE",
            AllocationStatus::Cancelled => "CANCELLED",
            AllocationStatus::Completed => "COMPLETED",
        }
    }

    /// 是否仍占用工单（Draft / Pending / Active）
    pub fn claims_work_orders(&self) -> bool {
        matches!(
            self,
            AllocationStatus::Draft | AllocationStatus::Pending | AllocationStatus::Active
        )
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, AllocationStatus::Completed | AllocationStatus::Cancelled)
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 摆放层 (Placement Level)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Base,     // 0 层（罐底）
    Elevated, // 1 层（支架层）
}

impl Level {
    pub fn index(&self) -> u8 {
        match self {
            Level::Base => 0,
            Level::Elevated => 1,
        }
    }

    pub fn from_index(idx: i64) -> Option<Self> {
        match idx {
            0 => Some(Level::Base),
            1 => Some(Level::Elevated),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

// ==========================================
// 排布结果标记 (Packing Status Tag)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackingStatus {
    ExactOptimal,  // 精确求解完成
    ExactFeasible, // 精确求解超时，采用已有可行解
    Heuristic,     // 启发式回退
}

impl PackingStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "EXACT_OPTIMAL" => Some(PackingStatus::ExactOptimal),
            "EXACT_FEASIBLE" => Some(PackingStatus::ExactFeasible),
            "HEURISTIC" => Some(PackingStatus::Heuristic),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PackingStatus::ExactOptimal => "EXACT_OPTIMAL",
            PackingStatus::ExactFeasible => "EXACT_FEASIBLE",
            PackingStatus::Heuristic => "HEURISTIC",
        }
    }

    /// 面向操作员的说明
    pub fn label(&self) -> &'static str {
        match self {
            PackingStatus::ExactOptimal => "exact optimal",
            PackingStatus::ExactFeasible => "exact feasible (time-bounded)",
            PackingStatus::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for PackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ==========================================
// 排除原因 (Exclusion Reason)
// ==========================================
// 每个被排除的工单有且仅有一个原因
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    Invalid(String),   // 数据不完整/不合法
    Oversize,          // 尺寸超出罐面
    Overweight,        // 超重
    ConnectorOverflow, // 真空接口不足
    NoVesselCapacity,  // 无可用罐
    InsufficientSpace, // 容量允许但排不下
}

/// 排除原因所属错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Validation,
    Capacity,
    Placement,
}

impl ExclusionReason {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExclusionReason::Invalid(_) => ErrorCategory::Validation,
            ExclusionReason::Oversize
            | ExclusionReason::Overweight
            | ExclusionReason::ConnectorOverflow
            | ExclusionReason::NoVesselCapacity => ErrorCategory::Capacity,
            ExclusionReason::InsufficientSpace => ErrorCategory::Placement,
        }
    }

    /// 持久化代码
    pub fn code(&self) -> &'static str {
        match self {
            ExclusionReason::Invalid(_) => "INVALID",
            ExclusionReason::Oversize => "OVERSIZE",
            ExclusionReason::Overweight => "OVERWEIGHT",
            ExclusionReason::ConnectorOverflow => "CONNECTOR_OVERFLOW",
            ExclusionReason::NoVesselCapacity => "NO_VESSEL_CAPACITY",
            ExclusionReason::InsufficientSpace => "INSUFFICIENT_SPACE",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ExclusionReason::Invalid(detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    pub fn from_code(code: &str, detail: Option<String>) -> Option<Self> {
        match code {
            "INVALID" => Some(ExclusionReason::Invalid(detail.unwrap_or_default())),
            "OVERSIZE" => Some(ExclusionReason::Oversize),
            "OVERWEIGHT" => Some(ExclusionReason::Overweight),
            "CONNECTOR_OVERFLOW" => Some(ExclusionReason::ConnectorOverflow),
            "NO_VESSEL_CAPACITY" => Some(ExclusionReason::NoVesselCapacity),
            "INSUFFICIENT_SPACE" => Some(ExclusionReason::InsufficientSpace),
            _ => None,
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Invalid(detail) => write!(f, "invalid: {}", detail),
            ExclusionReason::Oversize => f.write_str("oversize"),
            ExclusionReason::Overweight => f.write_str("overweight"),
            ExclusionReason::ConnectorOverflow => f.write_str("connector overflow"),
            ExclusionReason::NoVesselCapacity => f.write_str("no vessel capacity available"),
            ExclusionReason::InsufficientSpace => f.write_str("insufficient space"),
        }
    }
}
