// ==========================================
// 排产主流程集成测试
// ==========================================
// 测试目标: 计划 → 分配 → 时间窗 → 原因 → 单事务提交 的完整流程
// 数据库: tempfile 临时 SQLite
// ==========================================


use mold_aps::domain::{PlanStatus, RunStatus, ScheduleRule, TaskStatus};
use mold_aps::config::config_keys;
use mold_aps::engine::SkipCode;
use mold_aps::logging;
use std::collections::HashMap;
use test_helpers::*;

// ==========================================
// 基本场景
// ==========================================

#[tokio::test]
async fn test_single_plan_single_candidate() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 5);
    relate_device(&state, "MAT_A", "D1", 90);
    relate_mold(&state, "MAT_A", "M1", 80);
    add_plan(&state, "P1", "MAT_A", 250, ts(30, 0));

    let now = ts(1, 8);
    let result = state.engine.execute_at(now).await.expect("排产失败");

    assert!(result.committed);
    assert_eq!(result.tasks.len(), 1);
    let task = &result.tasks[0];
    assert_eq!(task.plan_id, "P1");
    assert_eq!(task.device_id, "D1");
    assert_eq!(task.mold_id, "M1");
    assert_eq!(task.task_quantity, 250);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(!task.is_overdue);
    // 250 / 100 * 3600 = 9000 秒
    assert_eq!(task.planned_start_time, now);
    assert_eq!(task.duration_secs(), 9000);
    assert!(!task.schedule_reason.is_empty());

    // 持久化校验
    let stored = state.task_repo.find_by_plan_id("P1").unwrap().unwrap();
    assert_eq!(stored.task_id, task.task_id);
    assert_eq!(stored.planned_end_time, task.planned_end_time);
    let plan = state.plan_repo.find_by_id("P1").unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Scheduled);
}

#[tokio::test]
async fn test_sub_second_now_keeps_stored_start_after_now() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    add_plan(&state, "P1", "MAT_A", 100, ts(30, 0));

    let now = ts(1, 8) + chrono::Duration::milliseconds(750);
    let result = state.engine.execute_at(now).await.unwrap();
    let task = &result.tasks[0];

    let stored = state.task_repo.find_by_plan_id("P1").unwrap().unwrap();
    assert_eq!(&stored, task);
    assert!(stored.planned_start_time >= now);
    assert_eq!(stored.planned_start_time, ts(1, 8) + chrono::Duration::seconds(1));
}

#[tokio::test]
async fn test_bound_single_instance_mold_forces_its_device() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D_A", 100.0);
    add_device(&state, "D_B", 100.0);
    add_mold(&state, "M_FIX", 1);

    // 第一次运行: MAT_X 只能用 D_A → M_FIX 绑定 D_A
    relate_device(&state, "MAT_X", "D_A", 50);
    relate_mold(&state, "MAT_X", "M_FIX", 50);
    add_plan(&state, "P_X", "MAT_X", 100, ts(30, 0));
    let first = state.engine.execute_at(ts(1, 8)).await.unwrap();
    assert_eq!(first.tasks[0].device_id, "D_A");

    // 第二次运行: MAT_Y 首选 D_B，但模具只能在 D_A 上运行
    relate_device(&state, "MAT_Y", "D_B", 90);
    relate_device(&state, "MAT_Y", "D_A", 10);
    relate_mold(&state, "MAT_Y", "M_FIX", 50);
    add_plan(&state, "P_Y", "MAT_Y", 100, ts(30, 0));
    let second = state.engine.execute_at(ts(1, 9)).await.unwrap();

    assert_eq!(second.tasks.len(), 1);
    let task = &second.tasks[0];
    assert_eq!(task.device_id, "D_A");
    assert_eq!(task.mold_id, "M_FIX");
    // 需等待上一个任务结束 (8:00 + 1h)
    assert_eq!(task.planned_start_time, ts(1, 9));
    // 决定设备的是单套模具绑定，而不是沿用历史
    assert_eq!(task.schedule_rule, ScheduleRule::MoldDeviceBinding);
    assert!(task.schedule_reason.starts_with(ScheduleRule::MoldDeviceBinding.title_cn()));

    let on_a = state.task_repo.find_by_device("D_A").unwrap();
    assert_eq!(on_a.len(), 2);
    assert!(on_a.iter().all(|t| t.mold_id == "M_FIX"));
    assert!(state.task_repo.find_by_device("D_B").unwrap().is_empty());
}

#[tokio::test]
async fn test_bound_mold_without_its_device_skips_plan() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D_A", 100.0);
    add_device(&state, "D_B", 100.0);
    add_mold(&state, "M_FIX", 1);

    relate_device(&state, "MAT_X", "D_A", 50);
    relate_mold(&state, "MAT_X", "M_FIX", 50);
    add_plan(&state, "P_X", "MAT_X", 100, ts(30, 0));
    state.engine.execute_at(ts(1, 8)).await.unwrap();

    // MAT_Y 只关联 D_B → 无兼容组合
    relate_device(&state, "MAT_Y", "D_B", 90);
    relate_mold(&state, "MAT_Y", "M_FIX", 50);
    add_plan(&state, "P_Y", "MAT_Y", 100, ts(30, 0));
    let result = state.engine.execute_at(ts(1, 9)).await.unwrap();

    assert!(result.tasks.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].code, SkipCode::NoCompatiblePair);
    let plan = state.plan_repo.find_by_id("P_Y").unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Unscheduled);
}

#[tokio::test]
async fn test_two_materials_sharing_mold_are_synchronized() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M_SHARED", 2);
    for material in ["MAT_A", "MAT_B"] {
        relate_device(&state, material, "D1", 50);
        relate_mold(&state, material, "M_SHARED", 50);
    }
    add_plan(&state, "P_A", "MAT_A", 200, ts(10, 0));
    add_plan(&state, "P_B", "MAT_B", 100, ts(11, 0));

    let result = state.engine.execute_at(ts(1, 8)).await.unwrap();
    assert_eq!(result.tasks.len(), 2);
    assert_eq!(result.stats.sync_group_count, 1);

    let (a, b) = (&result.tasks[0], &result.tasks[1]);
    assert_eq!(a.device_id, b.device_id);
    assert_eq!(a.mold_id, b.mold_id);
    assert_eq!(a.planned_start_time, b.planned_start_time);
    assert_eq!(a.planned_end_time, b.planned_end_time);
    assert!(a.sync_group_id.is_some());
    assert_eq!(a.sync_group_id, b.sync_group_id);
    assert_eq!(a.schedule_rule, ScheduleRule::MultiMaterialSync);
    assert_eq!(b.schedule_rule, ScheduleRule::MultiMaterialSync);
    // 窗口取最长成员时长: 200 / 100 = 2 小时
    assert_eq!(a.duration_secs(), 7200);

    // 同步组提交后重建快照不视为冲突
    assert_no_overlap(&all_tasks(&state));
}

#[tokio::test]
async fn test_zero_capacity_device_is_skipped() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D_ZERO", 0.0);
    add_device(&state, "D_OK", 50.0);
    add_mold(&state, "M1", 3);
    relate_device(&state, "MAT_A", "D_ZERO", 99);
    relate_device(&state, "MAT_A", "D_OK", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    add_plan(&state, "P1", "MAT_A", 100, ts(30, 0));

    // 只有零产能设备的物料 → 计划跳过
    add_device(&state, "D_ZERO_2", 0.0);
    add_mold(&state, "M2", 3);
    relate_device(&state, "MAT_B", "D_ZERO_2", 10);
    relate_mold(&state, "MAT_B", "M2", 1);
    add_plan(&state, "P2", "MAT_B", 100, ts(30, 0));

    let result = state.engine.execute_at(ts(1, 8)).await.unwrap();

    let task = result.tasks.iter().find(|t| t.plan_id == "P1").unwrap();
    assert_eq!(task.device_id, "D_OK");
    assert!(result.tasks.iter().all(|t| t.device_id != "D_ZERO" && t.device_id != "D_ZERO_2"));
    assert!(result
        .skipped
        .iter()
        .any(|s| s.plan_id == "P2" && s.code == SkipCode::NoCompatiblePair));
}

// ==========================================
// 性质
// ==========================================

#[tokio::test]
async fn test_windows_never_overlap_and_start_after_now() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 60.0);
    add_device(&state, "D2", 40.0);
    add_mold(&state, "M1", 1);
    add_mold(&state, "M2", 2);
    add_mold(&state, "M3", 2);
    for (material, mold) in [("MAT_A", "M1"), ("MAT_B", "M2"), ("MAT_C", "M3"), ("MAT_D", "M2")] {
        relate_device(&state, material, "D1", 10);
        relate_device(&state, material, "D2", 5);
        relate_mold(&state, material, mold, 10);
    }
    for i in 0..12u32 {
        let material = ["MAT_A", "MAT_B", "MAT_C", "MAT_D"][(i % 4) as usize];
        add_plan(&state, &format!("P{:02}", i), material, 30 + i64::from(i) * 10, ts(2 + i, 0));
    }

    let now = ts(1, 8);
    let result = state.engine.execute_at(now).await.unwrap();
    assert_eq!(result.tasks.len() + result.skipped.len(), 12);

    for task in &result.tasks {
        assert!(task.planned_start_time >= now);
        assert!(task.planned_end_time >= task.planned_start_time);
        assert_eq!(task.is_overdue, task.planned_end_time > task.due_date);
    }
    assert_no_overlap(&all_tasks(&state));

    // 单套模具只对应一台设备
    let mut fixed: HashMap<String, String> = HashMap::new();
    for task in all_tasks(&state).iter().filter(|t| t.mold_id == "M1") {
        let device = fixed.entry(task.mold_id.clone()).or_insert_with(|| task.device_id.clone());
        assert_eq!(device, &task.device_id);
    }
}

#[tokio::test]
async fn test_plans_processed_in_due_date_order() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    // 插入顺序与交期相反
    add_plan(&state, "P_LATE", "MAT_A", 100, ts(20, 0));
    add_plan(&state, "P_EARLY", "MAT_A", 100, ts(5, 0));

    let result = state.engine.execute_at(ts(1, 8)).await.unwrap();
    let early = result.tasks.iter().find(|t| t.plan_id == "P_EARLY").unwrap();
    let late = result.tasks.iter().find(|t| t.plan_id == "P_LATE").unwrap();
    assert!(early.planned_start_time < late.planned_start_time);
    assert_eq!(late.planned_start_time, early.planned_end_time);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    add_plan(&state, "P1", "MAT_A", 100, ts(20, 0));

    let first = state.engine.execute_at(ts(1, 8)).await.unwrap();
    assert_eq!(first.tasks.len(), 1);

    let second = state.engine.execute_at(ts(1, 9)).await.unwrap();
    assert!(second.tasks.is_empty());
    assert!(!second.committed);
    assert_eq!(second.message, "无待排产计划");
    assert_eq!(all_tasks(&state).len(), 1);
}

#[tokio::test]
async fn test_later_run_respects_committed_occupancy() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    add_plan(&state, "P1", "MAT_A", 300, ts(20, 0));
    state.engine.execute_at(ts(1, 8)).await.unwrap();

    // 新增更高权重设备 D2：同物料一致性仍沿用 D1/M1
    add_device(&state, "D2", 100.0);
    relate_device(&state, "MAT_A", "D2", 99);
    add_plan(&state, "P2", "MAT_A", 100, ts(20, 0));
    let result = state.engine.execute_at(ts(1, 9)).await.unwrap();

    // P1 占用 8:00-11:00
    assert_eq!(result.tasks[0].device_id, "D1");
    assert_eq!(result.tasks[0].planned_start_time, ts(1, 11));
    assert_eq!(result.tasks[0].schedule_rule, ScheduleRule::SameMaterialConsistency);
    assert_no_overlap(&all_tasks(&state));
}

#[tokio::test]
async fn test_sync_disabled_schedules_members_independently() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();
    state
        .config_manager
        .set_global_config_value(config_keys::SYNC_ENABLED, "false")
        .unwrap();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M_SHARED", 2);
    for material in ["MAT_A", "MAT_B"] {
        relate_device(&state, material, "D1", 50);
        relate_mold(&state, material, "M_SHARED", 50);
    }
    add_plan(&state, "P_A", "MAT_A", 200, ts(10, 0));
    add_plan(&state, "P_B", "MAT_B", 100, ts(11, 0));

    let result = state.engine.execute_at(ts(1, 8)).await.unwrap();
    assert_eq!(result.stats.sync_group_count, 0);
    assert!(result.tasks.iter().all(|t| t.sync_group_id.is_none()));
    assert!(result.tasks.iter().all(|t| t.schedule_rule != ScheduleRule::MultiMaterialSync));
    assert_eq!(result.tasks[1].planned_start_time, result.tasks[0].planned_end_time);
}

/// 先占满 D1 四天，再排一个交期在第三天的计划
fn seed_busy_preferred_device(state: &mold_aps::app::AppState) {
    add_device(state, "D1", 1.0);
    add_device(state, "D2", 10.0);
    add_mold(state, "M1", 2);
    add_mold(state, "M2", 2);

    relate_device(state, "MAT_X", "D1", 50);
    relate_mold(state, "MAT_X", "M1", 50);
    add_plan(state, "P0", "MAT_X", 96, ts(30, 0));
}

#[tokio::test]
async fn test_flexible_fallback_moves_overdue_plan() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();
    seed_busy_preferred_device(&state);
    state.engine.execute_at(ts(1, 8)).await.unwrap();

    relate_device(&state, "MAT_A", "D1", 90);
    relate_device(&state, "MAT_A", "D2", 10);
    relate_mold(&state, "MAT_A", "M2", 50);
    add_plan(&state, "P1", "MAT_A", 10, ts(3, 0));

    let result = state.engine.execute_at(ts(1, 9)).await.unwrap();
    let task = &result.tasks[0];
    assert_eq!(task.device_id, "D2");
    assert!(!task.is_overdue);
    assert_eq!(task.schedule_rule, ScheduleRule::FlexibleFallback);
}

#[tokio::test]
async fn test_fallback_disabled_keeps_weight_order() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();
    state
        .config_manager
        .set_global_config_value(config_keys::FLEXIBLE_FALLBACK_ENABLED, "false")
        .unwrap();
    seed_busy_preferred_device(&state);
    state.engine.execute_at(ts(1, 8)).await.unwrap();

    relate_device(&state, "MAT_A", "D1", 90);
    relate_device(&state, "MAT_A", "D2", 10);
    relate_mold(&state, "MAT_A", "M2", 50);
    add_plan(&state, "P1", "MAT_A", 10, ts(3, 0));

    let result = state.engine.execute_at(ts(1, 9)).await.unwrap();
    let task = &result.tasks[0];
    assert_eq!(task.device_id, "D1");
    assert!(task.is_overdue);
    // D1 被 P0 占用至第5天 8:00
    assert_eq!(task.planned_start_time, ts(5, 8));
    assert_eq!(result.stats.overdue_count, 1);
}

// ==========================================
// 附加能力
// ==========================================

#[tokio::test]
async fn test_dry_run_leaves_database_untouched() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 100.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    add_plan(&state, "P1", "MAT_A", 100, ts(20, 0));

    let result = state.engine.execute_dry_run_at(ts(1, 8)).await.unwrap();
    assert!(result.dry_run);
    assert!(!result.committed);
    assert_eq!(result.tasks.len(), 1);

    assert!(all_tasks(&state).is_empty());
    assert!(state.run_log_repo.find_recent(10).unwrap().is_empty());
    let plan = state.plan_repo.find_by_id("P1").unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Unscheduled);
}

#[tokio::test]
async fn test_run_log_records_outcome() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    add_device(&state, "D1", 10.0);
    add_mold(&state, "M1", 2);
    relate_device(&state, "MAT_A", "D1", 1);
    relate_mold(&state, "MAT_A", "M1", 1);
    // 1000 件 / 10 件每小时 → 必然逾期
    add_plan(&state, "P1", "MAT_A", 1000, ts(1, 12));
    add_plan(&state, "P_NORES", "MAT_NONE", 10, ts(2, 0));

    let result = state.engine.execute_at(ts(1, 8)).await.unwrap();
    assert_eq!(result.stats.overdue_count, 1);
    assert_eq!(result.stats.skipped_count, 1);

    let logs = state.run_log_repo.find_recent(10).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].run_id, result.run_id);
    assert_eq!(logs[0].status, RunStatus::Succeeded);
    assert_eq!(logs[0].scheduled_count, 1);
    assert_eq!(logs[0].skipped_count, 1);
    assert_eq!(logs[0].overdue_count, 1);
    assert!(logs[0].config_snapshot_json.is_some());
}

#[tokio::test]
async fn test_api_response_shape() {
    logging::init_test();
    let (_temp_file, state) = create_test_state();

    let resp = state.scheduling_api.execute().await.unwrap();
    assert!(resp.success);
    assert!(resp.tasks.is_empty());
    assert!(resp.skipped.is_empty());
    assert!(resp.run_id.is_some());
    assert_eq!(resp.message, "无待排产计划");
}
