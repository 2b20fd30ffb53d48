// ==========================================
// 方案生命周期端到端测试
// ==========================================
// 职责: 验证 runManual / runAutomatic 落库与状态流转
// - Draft → Pending → Active → Completed 全流程
// - 罐故障后提交失败且状态不变
// - 同一罐同时只能有一个 Active 方案
// - revision 过期写入报 Conflict
// ==========================================


#[cfg(test)]
mod lifecycle_flow_test {
    use async_trait::async_trait;
    use autoclave_aps::api::{AllocationApi, ApiError};
    use autoclave_aps::config::AllocationConfig;
    use autoclave_aps::domain::{
        AllocationStatus, ExclusionReason, Vessel, VesselStatus, WorkOrder, WorkOrderStatus,
    };
    use autoclave_aps::engine::{
        AllocationEventType, AllocationLifecycle, CollectingEventPublisher, OptionalEventPublisher,
    };
    use autoclave_aps::app::AppState;
    use autoclave_aps::repository::{
        AllocationRepository, CureCycleRepository, RepositoryResult, VesselCatalog,
        WorkOrderRepository,
    };
    use std::sync::Arc;
    use std::thread;

    use crate::test_helpers::{
        create_test_db, create_test_state, cure_cycle, find_vessel, find_work_order, seed, vessel,
        work_order,
    };

    fn config() -> AllocationConfig {
        AllocationConfig {
            exact_time_budget_ms: Some(2_000),
            ..AllocationConfig::default()
        }
    }

    fn small_orders(count: usize) -> Vec<WorkOrder> {
        (1..=count)
            .map(|i| work_order(&format!("WO-{}", i), 300.0, 300.0, 50.0, 2, "C1"))
            .collect()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    // ==========================================
    // 全流程
    // ==========================================

    #[tokio::test]
    async fn test_manual_allocation_full_lifecycle() {
        autoclave_aps::logging::init_test();
        let (_tmp, db_path) = create_test_db().unwrap();
        let events = Arc::new(CollectingEventPublisher::new());
        let state = AppState::with_publisher(db_path, events.clone()).unwrap();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &small_orders(2), &[cure_cycle("C1")]);
        let api = &state.allocation_api;

        let draft = api
            .run_manual(&ids(&["WO-1", "WO-2"]), Some("夜班装罐".to_string()), &config())
            .await
            .unwrap();
        assert_eq!(draft.status, AllocationStatus::Draft);
        assert_eq!(draft.note.as_deref(), Some("夜班装罐"));
        assert_eq!(draft.included_count(), 2);
        assert!(draft.config_snapshot_json.is_some());
        // Draft 不预留罐
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Available);

        let pending = api.promote(&draft.allocation_id).unwrap();
        assert_eq!(pending.status, AllocationStatus::Pending);
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::InUse);

        let active = api.confirm(&draft.allocation_id, "shift_lead").unwrap();
        assert_eq!(active.status, AllocationStatus::Active);
        assert_eq!(active.confirmed_by.as_deref(), Some("shift_lead"));
        assert!(active.confirmed_at.is_some());
        assert_eq!(find_work_order(&state, "WO-1").status, WorkOrderStatus::Curing);

        let completed = api.complete(&draft.allocation_id).unwrap();
        assert_eq!(completed.status, AllocationStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Available);
        for id in ["WO-1", "WO-2"] {
            let wo = find_work_order(&state, id);
            assert_eq!(wo.status, WorkOrderStatus::Done);
            assert_eq!(wo.previous_status, Some(WorkOrderStatus::Curing));
        }

        let kinds: Vec<AllocationEventType> = events.events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                AllocationEventType::Promoted,
                AllocationEventType::Confirmed,
                AllocationEventType::Completed
            ]
        );

        // 终态不可再流转
        let err = api.cancel(&draft.allocation_id, "planner").unwrap_err();
        assert_eq!(err.current_state(), Some("COMPLETED"));
    }

    #[tokio::test]
    async fn test_promote_after_vessel_fault_leaves_state_unchanged() {
        let (_tmp, state) = create_test_state();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &small_orders(1), &[cure_cycle("C1")]);

        let draft = state
            .allocation_api
            .run_manual(&ids(&["WO-1"]), None, &config())
            .await
            .unwrap();
        state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::Faulted, None)
            .unwrap();

        let err = state.allocation_api.promote(&draft.allocation_id).unwrap_err();
        assert!(matches!(err, ApiError::StateConflict { .. }));
        assert_eq!(err.current_state(), Some("FAULTED"));

        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Faulted);
        assert_eq!(find_work_order(&state, "WO-1").status, WorkOrderStatus::AwaitingCure);
        let stored = state.allocation_api.get(&draft.allocation_id).unwrap();
        assert_eq!(stored.status, AllocationStatus::Draft);
    }

    #[tokio::test]
    async fn test_second_confirm_on_same_vessel_conflicts() {
        let (_tmp, state) = create_test_state();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &small_orders(2), &[cure_cycle("C1")]);
        let api = &state.allocation_api;

        let first = api.run_manual(&ids(&["WO-1"]), None, &config()).await.unwrap();
        let second = api.run_manual(&ids(&["WO-2"]), None, &config()).await.unwrap();
        assert_eq!(first.vessel_id, second.vessel_id);

        api.promote(&first.allocation_id).unwrap();
        api.confirm(&first.allocation_id, "shift_lead").unwrap();

        // 罐已占用，第二个 Draft 无法提交
        let err = api.promote(&second.allocation_id).unwrap_err();
        assert_eq!(err.current_state(), Some("IN_USE"));

        // 直接写入一个 Pending 方案，确认时仍被拦截
        let repo = AllocationRepository::new(state.conn.clone());
        let mut pending = second.clone();
        pending.allocation_id = "A-FORCED".to_string();
        pending.status = AllocationStatus::Pending;
        api.cancel(&second.allocation_id, "planner").unwrap();
        repo.insert(&pending).unwrap();

        let err = api.confirm("A-FORCED", "shift_lead").unwrap_err();
        assert!(matches!(err, ApiError::StateConflict { .. }));
        assert_eq!(api.list(Some(AllocationStatus::Active)).unwrap().len(), 1);
        assert_eq!(find_work_order(&state, "WO-2").status, WorkOrderStatus::AwaitingCure);
    }

    #[tokio::test]
    async fn test_concurrent_confirm_has_single_winner() {
        let (_tmp, state) = create_test_state();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &small_orders(1), &[cure_cycle("C1")]);

        let draft = state
            .allocation_api
            .run_manual(&ids(&["WO-1"]), None, &config())
            .await
            .unwrap();
        state.allocation_api.promote(&draft.allocation_id).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let api = state.allocation_api.clone();
                let id = draft.allocation_id.clone();
                thread::spawn(move || api.confirm(&id, &format!("lead-{}", i)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApiError::StateConflict { .. } | ApiError::Conflict(_)));
        }
    }

    #[tokio::test]
    async fn test_stale_revision_reports_conflict() {
        let (_tmp, state) = create_test_state();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &[], &[]);

        let current = find_vessel(&state, "V1");
        state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::Maintenance, Some(current.revision))
            .unwrap();

        // 用旧 revision 再写一次
        let err = state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::Available, Some(current.revision))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Maintenance);

        // IN_USE 只能由方案流转写入
        let err = state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::InUse, None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    // ==========================================
    // 自动运行
    // ==========================================

    #[tokio::test]
    async fn test_run_automatic_persists_pending_and_reserves_vessels() {
        let (_tmp, state) = create_test_state();
        let mut wos = small_orders(3);
        wos.push(work_order("WO-C2", 400.0, 400.0, 60.0, 2, "C2"));
        seed(
            &state,
            &[vessel("V1", 1000.0, 1000.0, 500.0, 8), vessel("V2", 1000.0, 1000.0, 500.0, 8)],
            &wos,
            &[cure_cycle("C1"), cure_cycle("C2")],
        );

        let result = state.allocation_api.run_automatic(&config()).await.unwrap();

        assert_eq!(result.allocations.len(), 2);
        assert!(result.conflicts.is_empty());
        for allocation in &result.allocations {
            assert_eq!(allocation.status, AllocationStatus::Pending);
            assert_eq!(find_vessel(&state, &allocation.vessel_id).status, VesselStatus::InUse);
        }
        assert_eq!(state.allocation_api.list(Some(AllocationStatus::Pending)).unwrap().len(), 2);

        // 工单已被占用，再次运行不产生新方案
        let again = state.allocation_api.run_automatic(&config()).await.unwrap();
        assert!(again.allocations.is_empty());
        assert!(again.unallocated.is_empty());
    }

    /// 返回运行开始时读到的罐快照，不反映之后的状态变化
    struct SnapshotVessels(Vec<Vessel>);

    #[async_trait]
    impl VesselCatalog for SnapshotVessels {
        async fn vessels(&self) -> RepositoryResult<Vec<Vessel>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_run_automatic_conflict_keeps_excluded_work_orders() {
        let (_tmp, state) = create_test_state();
        let v1 = vessel("V1", 1000.0, 1000.0, 500.0, 8);
        let wos = vec![
            work_order("WO-1", 300.0, 300.0, 300.0, 2, "C1"),
            work_order("WO-2", 300.0, 300.0, 300.0, 2, "C1"),
        ];
        seed(&state, &[v1.clone()], &wos, &[cure_cycle("C1")]);

        // 运行读到 Available，落库前罐已故障
        state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::Faulted, None)
            .unwrap();
        let api = AllocationApi::new(
            Arc::new(WorkOrderRepository::new(state.conn.clone())),
            Arc::new(SnapshotVessels(vec![v1])),
            Arc::new(CureCycleRepository::new(state.conn.clone())),
            Arc::new(AllocationRepository::new(state.conn.clone())),
            Arc::new(AllocationLifecycle::new(state.conn.clone(), OptionalEventPublisher::none())),
        );

        let result = api.run_automatic(&config()).await.unwrap();

        assert!(result.allocations.is_empty());
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.vessel_id, "V1");
        assert_eq!(conflict.wo_ids.len(), 1);

        // 每个工单恰好出现一次
        assert_eq!(result.unallocated.len(), 1);
        let left = &result.unallocated[0];
        assert_ne!(left.wo_id, conflict.wo_ids[0]);
        assert_eq!(left.reason, ExclusionReason::Overweight);
        assert!(result.rejected.is_empty());

        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Faulted);
        assert!(state.allocation_api.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_pending_releases_vessel_for_next_run() {
        let (_tmp, state) = create_test_state();
        seed(&state, &[vessel("V1", 1000.0, 1000.0, 500.0, 8)], &small_orders(2), &[cure_cycle("C1")]);

        let result = state.allocation_api.run_automatic(&config()).await.unwrap();
        assert_eq!(result.allocations.len(), 1);
        let allocation_id = result.allocations[0].allocation_id.clone();

        let cancelled = state.allocation_api.cancel(&allocation_id, "planner").unwrap();
        assert_eq!(cancelled.status, AllocationStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by.as_deref(), Some("planner"));
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Available);

        // 软删除：记录仍在，但不再占用工单
        assert_eq!(state.allocation_api.list_by_vessel("V1").unwrap().len(), 1);
        let rerun = state.allocation_api.run_automatic(&config()).await.unwrap();
        assert_eq!(rerun.allocations.len(), 1);
        assert_eq!(rerun.allocations[0].included_count(), 2);
    }

    // ==========================================
    // 人工运行错误
    // ==========================================

    #[tokio::test]
    async fn test_run_manual_errors() {
        let (_tmp, state) = create_test_state();
        let mut wos = small_orders(2);
        wos.push(work_order("WO-C2", 300.0, 300.0, 50.0, 2, "C2"));
        wos.push(work_order("WO-BIG", 1500.0, 1500.0, 50.0, 2, "C1"));
        let mut preparing = work_order("WO-PREP", 300.0, 300.0, 50.0, 2, "C1");
        preparing.status = WorkOrderStatus::Preparing;
        wos.push(preparing);
        seed(
            &state,
            &[vessel("V1", 1000.0, 1000.0, 500.0, 8)],
            &wos,
            &[cure_cycle("C1"), cure_cycle("C2")],
        );
        let api = &state.allocation_api;

        let err = api.run_manual(&[], None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = api.run_manual(&ids(&["WO-1", "WO-404"]), None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref msg) if msg.contains("WO-404")));

        let err = api.run_manual(&ids(&["WO-1", "WO-C2"]), None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = api.run_manual(&ids(&["WO-PREP"]), None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = api.run_manual(&ids(&["WO-BIG"]), None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::CapacityError(ref msg) if msg.contains(&ExclusionReason::Oversize.to_string())));

        // 已被 Draft 占用的工单不能再进入新方案
        api.run_manual(&ids(&["WO-1"]), None, &config()).await.unwrap();
        let err = api.run_manual(&ids(&["WO-1", "WO-2"]), None, &config()).await.unwrap_err();
        assert!(matches!(err, ApiError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_run_manual_without_available_vessel_is_capacity_error() {
        let (_tmp, state) = create_test_state();
        let mut v = vessel("V1", 1000.0, 1000.0, 500.0, 8);
        v.status = VesselStatus::Off;
        seed(&state, &[v], &small_orders(1), &[cure_cycle("C1")]);

        let err = state
            .allocation_api
            .run_manual(&ids(&["WO-1"]), None, &config())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::CapacityError(_)));
    }
}
