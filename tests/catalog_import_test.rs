// ==========================================
// 目录导入与配置持久化测试
// ==========================================
// 职责: CSV 导入 → 预览 端到端；配置读写与快照恢复
// ==========================================


#[cfg(test)]
mod catalog_import_test {
    use autoclave_aps::api::ApiError;
    use autoclave_aps::config::{AllocationConfig, OptimizationPriority};
    use autoclave_aps::domain::{AllocationStatus, VesselStatus, WorkOrderStatus};
    use autoclave_aps::importer::{CatalogKind, ImportSummary};
    use std::io::Write;
    use std::path::Path;
    use tempfile::{Builder, NamedTempFile};

    use crate::test_helpers::{
        create_test_state, cure_cycle, find_vessel, find_work_order, seed, vessel, work_order,
    };

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_import_catalogs_then_preview() {
        let (_tmp, state) = create_test_state();

        let cycles = write_csv(
            "cycle_id,name,stage1_temperature_c,stage1_pressure_bar,stage1_duration_min,stage2_temperature_c,stage2_pressure_bar,stage2_duration_min\n\
             C180,180C 标准,120,3,60,180,6,120\n",
        );
        let vessels = write_csv(
            "罐号,name,usable_width_mm,usable_length_mm,weight_limit_kg,connector_capacity\n\
             V1,AC-1,1000,1000,500,8\n\
             V2,AC-2,abc,1000,500,8\n",
        );
        let work_orders = write_csv(
            "工单号,零件号,宽度,长度,重量,接口数,固化曲线,优先级\n\
             WO-1,P-1,300,300,50,2,C180,1\n\
             WO-2,P-2,300,300,50,2,C180,0\n\
             WO-3,P-3,,300,50,2,C180,0\n",
        );

        let summary = state.catalog_api.import_cure_cycles(cycles.path()).await.unwrap();
        assert_eq!(summary.kind, CatalogKind::CureCycles);
        assert_eq!(summary.imported, 1);

        let summary = state.catalog_api.import_vessels(vessels.path()).await.unwrap();
        assert_eq!(summary.read, 2);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0].row_number, 3);

        let summary = state.catalog_api.import_work_orders(work_orders.path()).await.unwrap();
        assert_eq!(summary.read, 3);
        assert_eq!(summary.imported, 3);

        assert_eq!(state.catalog_api.list_vessels().unwrap().len(), 1);
        let wo = find_work_order(&state, "WO-1");
        assert_eq!(wo.status, WorkOrderStatus::AwaitingCure);
        assert_eq!(wo.cure_cycle_id.as_deref(), Some("C180"));

        let config = AllocationConfig {
            exact_time_budget_ms: Some(2_000),
            ..AllocationConfig::default()
        };
        let outcome = state.allocation_api.preview(None, &config).await.unwrap();
        assert_eq!(outcome.included_count(), 2);
        // 缺宽度的工单作为数据不完整被拒绝
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].wo_id, "WO-3");
    }

    #[tokio::test]
    async fn test_import_errors() {
        let (_tmp, state) = create_test_state();

        let err = state
            .catalog_api
            .import_vessels(Path::new("/nonexistent/vessels.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let file = Builder::new().suffix(".txt").tempfile().unwrap();
        let err = state.catalog_api.import_vessels(file.path()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_reimport_during_active_allocation_keeps_lifecycle_status() {
        let (_tmp, state) = create_test_state();
        seed(
            &state,
            &[vessel("V1", 1000.0, 1000.0, 500.0, 8)],
            &[work_order("WO-1", 300.0, 300.0, 50.0, 2, "C1")],
            &[cure_cycle("C1")],
        );
        let config = AllocationConfig {
            exact_time_budget_ms: Some(2_000),
            ..AllocationConfig::default()
        };
        let api = &state.allocation_api;
        let draft = api
            .run_manual(&["WO-1".to_string()], None, &config)
            .await
            .unwrap();
        api.promote(&draft.allocation_id).unwrap();
        api.confirm(&draft.allocation_id, "shift_lead").unwrap();
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::InUse);
        assert_eq!(find_work_order(&state, "WO-1").status, WorkOrderStatus::Curing);

        let vessels = write_csv(
            "罐号,name,usable_width_mm,usable_length_mm,weight_limit_kg,connector_capacity\n\
             V1,AC-1,1000,1000,600,8\n",
        );
        let work_orders = write_csv(
            "工单号,零件号,宽度,长度,重量,接口数,固化曲线,优先级\n\
             WO-1,P-1,300,300,50,2,C1,4\n",
        );
        assert_eq!(imported_without_errors(state.catalog_api.import_vessels(vessels.path()).await), 1);
        assert_eq!(imported_without_errors(state.catalog_api.import_work_orders(work_orders.path()).await), 1);

        // 目录参数已更新，占用状态不变
        let v1 = find_vessel(&state, "V1");
        assert_eq!(v1.status, VesselStatus::InUse);
        assert_eq!(v1.weight_limit_kg, 600.0);
        let wo = find_work_order(&state, "WO-1");
        assert_eq!(wo.status, WorkOrderStatus::Curing);
        assert_eq!(wo.previous_status, Some(WorkOrderStatus::AwaitingCure));
        assert_eq!(wo.priority, 4);

        let completed = api.complete(&draft.allocation_id).unwrap();
        assert_eq!(completed.status, AllocationStatus::Completed);
        assert_eq!(find_vessel(&state, "V1").status, VesselStatus::Available);
        assert_eq!(find_work_order(&state, "WO-1").status, WorkOrderStatus::Done);

        // 已完成的工单再次导入也保持 Done
        let again = write_csv(
            "工单号,零件号,宽度,长度,重量,接口数,固化曲线,优先级\n\
             WO-1,P-1,300,300,50,2,C1,4\n",
        );
        state.catalog_api.import_work_orders(again.path()).await.unwrap();
        assert_eq!(find_work_order(&state, "WO-1").status, WorkOrderStatus::Done);
    }

    fn imported_without_errors(result: Result<ImportSummary, ApiError>) -> usize {
        let summary = result.unwrap();
        assert_eq!(summary.failed, 0);
        summary.imported
    }

    #[test]
    fn test_floor_status_transitions() {
        let (_tmp, state) = create_test_state();
        seed(
            &state,
            &[vessel("V1", 1000.0, 1000.0, 500.0, 8)],
            &[work_order("WO-1", 300.0, 300.0, 20.0, 1, "C1")],
            &[],
        );

        let wo = state
            .catalog_api
            .set_work_order_status("WO-1", WorkOrderStatus::InProgress, None)
            .unwrap();
        assert_eq!(wo.status, WorkOrderStatus::InProgress);
        assert_eq!(wo.previous_status, Some(WorkOrderStatus::AwaitingCure));

        let err = state
            .catalog_api
            .set_work_order_status("WO-1", WorkOrderStatus::Done, None)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let vessel = state
            .catalog_api
            .set_vessel_status("V1", VesselStatus::Faulted, None)
            .unwrap();
        assert_eq!(vessel.status, VesselStatus::Faulted);
    }

    // ==========================================
    // 配置
    // ==========================================

    #[test]
    fn test_config_round_trip_and_snapshot() {
        let (_tmp, state) = create_test_state();
        let manager = &state.config_manager;

        let defaults = manager.load_allocation_config().unwrap();
        assert_eq!(defaults, AllocationConfig::default());

        let mut config = AllocationConfig::default();
        config.padding_margin_mm = 20.0;
        config.rotation_allowed = false;
        config.optimization_priority = OptimizationPriority::Weight;
        config.connector_cap_overrides.insert("V1".to_string(), 4);
        config.exact_time_budget_ms = Some(5_000);
        manager.save_allocation_config(&config).unwrap();
        assert_eq!(manager.load_allocation_config().unwrap(), config);

        let snapshot = manager.get_config_snapshot().unwrap();
        manager.save_allocation_config(&AllocationConfig::default()).unwrap();
        assert_eq!(manager.load_allocation_config().unwrap().padding_margin_mm, 15.0);

        manager.restore_config_from_snapshot(&snapshot).unwrap();
        assert_eq!(manager.load_allocation_config().unwrap(), config);
    }
}
