// ==========================================
// 固化罐装载分配系统 - 生命周期事件发布
// ==========================================
// 职责: 定义方案生命周期事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，外部报表/通知系统实现适配器
// 事件在事务提交之后发布，发布失败不回滚状态
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 生命周期事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEventType {
    /// Draft → Pending，罐已预留
    Promoted,
    /// Pending → Active，工单进入固化
    Confirmed,
    /// Draft/Pending → Cancelled
    Cancelled,
    /// Active → Completed（完工通知）
    Completed,
}

impl AllocationEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AllocationEventType::Promoted => "Promoted",
            AllocationEventType::Confirmed => "Confirmed",
            AllocationEventType::Cancelled => "Cancelled",
            AllocationEventType::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub allocation_id: String,
    pub vessel_id: String,
    pub event_type: AllocationEventType,
    /// 操作角色（确认/取消时记录）
    pub actor: Option<String>,
    pub wo_ids: Vec<String>,
    pub occurred_at: NaiveDateTime,
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 生命周期事件发布者
///
/// # 返回
/// - `Ok(id)`: 下游回执 id（不支持时为空字符串）
pub trait AllocationEventPublisher: Send + Sync {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl AllocationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - allocation_id={}, event_type={}",
            event.allocation_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 内存收集器（测试与本地调试用）
#[derive(Debug, Default)]
pub struct CollectingEventPublisher {
    events: Mutex<Vec<AllocationEvent>>,
}

impl CollectingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AllocationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AllocationEventPublisher for CollectingEventPublisher {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| format!("事件缓存锁获取失败: {}", e))?;
        events.push(event);
        Ok(events.len().to_string())
    }
}

/// 可选的事件发布者包装
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn AllocationEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn AllocationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）；失败只记日志
    pub fn publish(&self, event: AllocationEvent) {
        match &self.inner {
            Some(publisher) => {
                let allocation_id = event.allocation_id.clone();
                let event_type = event.event_type;
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(
                        allocation_id = %allocation_id,
                        event_type = event_type.as_str(),
                        error = %e,
                        "生命周期事件发布失败"
                    );
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - allocation_id={}, event_type={}",
                    event.allocation_id,
                    event.event_type.as_str()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
