// ==========================================
// 固化罐装载分配系统 - 引擎层
// ==========================================
// 职责: 分组、选罐、几何排布、方案生命周期
// 红线: 排布/选罐引擎不拼 SQL；每个排除必须输出 reason
// ==========================================

pub mod cycle_grouper;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod packer;
pub mod validation;
pub mod vessel_selector;

// 重导出核心引擎
pub use cycle_grouper::{CycleGroup, CycleGrouper, GroupingResult};
pub use events::{
    AllocationEvent, AllocationEventPublisher, AllocationEventType, CollectingEventPublisher,
    NoOpEventPublisher, OptionalEventPublisher,
};
pub use lifecycle::{AllocationLifecycle, LifecycleError, LifecycleResult};
pub use orchestrator::{AllocationRunner, RunOutcome};
pub use packer::{GeometricPacker, PackOutcome, PackRequest, PackerPhase};
pub use validation::CatalogValidator;
pub use vessel_selector::{Ranking, VesselCandidate, VesselSelector};
