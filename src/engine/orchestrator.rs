// ==========================================
// 注塑排产系统 - 排产引擎编排器
// ==========================================
// 用途: 协调一次排产运行的完整流程
// 流程: 运行锁 → 加载计划(交期升序) → 构建占用快照
//       → 共模同步分组 → 逐计划: 候选解析 → 分配 → 时间窗 → 原因标注
//       → 快照原地扩展 → 单事务提交 → 运行日志
// 红线: 运行互斥；超时中止不落库；提交失败整体回滚
// ==========================================

use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{SchedulingConfigReader, SchedulingSettings};
use crate::domain::{
    ProductionPlan, ProductionTask, RunStatus, ScheduleRunLog, TaskStatus,
};
use crate::engine::allocator::{AllocationDecision, AllocationOutcome, Allocator, SkipCode};
use crate::engine::candidate::CandidateResolver;
use crate::engine::committer::TaskCommitter;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::occupancy::{OccupancySnapshot, OccupiedWindow};
use crate::engine::reason::ReasonAnnotator;
use crate::engine::repositories::{RunLockStore, SchedulingRepositories};
use crate::engine::sync_group::{index_members, SyncGroupPlanner};

/// 排产运行锁名
pub const RUN_LOCK_NAME: &str = "production_scheduling";

// ==========================================
// 运行结果
// ==========================================

/// 被跳过的计划
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPlan {
    pub plan_id: String,
    pub plan_no: String,
    pub material_id: String,
    pub code: SkipCode,
    pub message: String,
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub plans_count: usize,
    pub scheduled_count: usize,
    pub skipped_count: usize,
    pub overdue_count: usize,
    pub sync_group_count: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRunResult {
    pub run_id: String,
    pub dry_run: bool,
    pub committed: bool,
    pub tasks: Vec<ProductionTask>,
    pub skipped: Vec<SkippedPlan>,
    pub stats: RunStatistics,
    pub message: String,
}

// ==========================================
// RunLockGuard - 运行锁 (离开作用域自动释放)
// ==========================================
struct RunLockGuard {
    store: Arc<dyn RunLockStore>,
    lock_name: &'static str,
    holder: String,
}

impl RunLockGuard {
    fn acquire(
        store: Arc<dyn RunLockStore>,
        lock_name: &'static str,
        holder: &str,
        stale_after_secs: i64,
    ) -> SchedulingResult<Self> {
        if !store.try_acquire(lock_name, holder, stale_after_secs)? {
            warn!(lock_name = lock_name, "已有排产运行持有锁，拒绝本次运行");
            return Err(SchedulingError::AlreadyRunning {
                lock_name: lock_name.to_string(),
            });
        }
        debug!(lock_name = lock_name, holder = holder, "获取排产运行锁");
        Ok(Self {
            store,
            lock_name,
            holder: holder.to_string(),
        })
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.release(self.lock_name, &self.holder) {
            warn!(lock_name = self.lock_name, error = %e, "释放排产运行锁失败");
        }
    }
}

// ==========================================
// RunClock - 运行时限
// ==========================================
struct RunClock {
    started: Instant,
    deadline: Duration,
}

impl RunClock {
    fn start(deadline: Duration) -> Self {
        Self {
            started: Instant::now(),
            deadline,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn check(&self, stage: &'static str) -> SchedulingResult<()> {
        let elapsed = self.elapsed();
        if elapsed >= self.deadline {
            warn!(stage = stage, elapsed_ms = elapsed.as_millis() as u64, "排产运行超时，中止");
            return Err(SchedulingError::DeadlineExceeded {
                elapsed_ms: elapsed.as_millis(),
                deadline_secs: self.deadline.as_secs(),
                stage,
            });
        }
        Ok(())
    }
}

// ==========================================
// SchedulingEngine - 排产引擎
// ==========================================
pub struct SchedulingEngine<C>
where
    C: SchedulingConfigReader,
{
    config: Arc<C>,
    repos: SchedulingRepositories,
    allocator: Allocator,
    annotator: ReasonAnnotator,
    deadline_override: Option<Duration>,
}

impl<C> SchedulingEngine<C>
where
    C: SchedulingConfigReader,
{
    /// 创建新的排产引擎
    ///
    /// # 参数
    /// - config: 配置读取器
    /// - repos: 仓储集合
    pub fn new(config: Arc<C>, repos: SchedulingRepositories) -> Self {
        Self {
            config,
            repos,
            allocator: Allocator::new(),
            annotator: ReasonAnnotator::new(),
            deadline_override: None,
        }
    }

    /// 覆盖运行时限（优先于配置）
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_override = Some(deadline);
        self
    }

    /// 执行一次排产并提交
    pub async fn execute(&self) -> SchedulingResult<ScheduleRunResult> {
        self.execute_at(Local::now().naive_local()).await
    }

    /// 试算（不提交、不写运行日志、不占用运行锁）
    pub async fn execute_dry_run(&self) -> SchedulingResult<ScheduleRunResult> {
        self.execute_dry_run_at(Local::now().naive_local()).await
    }

    /// 以指定的当前时间执行排产并提交
    pub async fn execute_at(&self, now: NaiveDateTime) -> SchedulingResult<ScheduleRunResult> {
        self.run(now, false).await
    }

    /// 以指定的当前时间试算
    pub async fn execute_dry_run_at(&self, now: NaiveDateTime) -> SchedulingResult<ScheduleRunResult> {
        self.run(now, true).await
    }

    #[instrument(skip(self))]
    async fn run(&self, now: NaiveDateTime, dry_run: bool) -> SchedulingResult<ScheduleRunResult> {
        // 落库时间精度为秒；向上取整保证 planned_start_time >= now
        let now = ceil_to_second(now);
        let settings = SchedulingSettings::load(self.config.as_ref()).await?;
        let config_snapshot = if dry_run {
            None
        } else {
            match self.config.get_config_snapshot_json().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "配置快照获取失败，运行日志不记录配置");
                    None
                }
            }
        };

        let run_id = Uuid::new_v4().to_string();
        let _guard = if dry_run {
            None
        } else {
            Some(RunLockGuard::acquire(
                self.repos.run_lock.clone(),
                RUN_LOCK_NAME,
                &run_id,
                settings.run_lock_stale_secs,
            )?)
        };

        let deadline = self
            .deadline_override
            .unwrap_or_else(|| Duration::from_secs(settings.run_deadline_secs));
        let clock = RunClock::start(deadline);

        info!(
            run_id = %run_id,
            now = %now,
            dry_run = dry_run,
            sync_enabled = settings.sync_enabled,
            flexible_fallback_enabled = settings.flexible_fallback_enabled,
            "开始排产运行"
        );

        let outcome = self.compute(&run_id, now, &settings, &clock, dry_run);

        match outcome {
            Ok(mut result) => {
                result.stats.elapsed_ms = clock.elapsed().as_millis() as u64;
                if !dry_run {
                    let status = if result.stats.plans_count == 0 {
                        RunStatus::NoWork
                    } else {
                        RunStatus::Succeeded
                    };
                    self.record_run_log(ScheduleRunLog {
                        run_id: run_id.clone(),
                        started_at: now,
                        finished_at: finished_at(now, &clock),
                        status,
                        plans_count: result.stats.plans_count,
                        scheduled_count: result.stats.scheduled_count,
                        skipped_count: result.stats.skipped_count,
                        overdue_count: result.stats.overdue_count,
                        message: result.message.clone(),
                        config_snapshot_json: config_snapshot,
                    });
                }
                info!(
                    run_id = %run_id,
                    scheduled_count = result.stats.scheduled_count,
                    skipped_count = result.stats.skipped_count,
                    overdue_count = result.stats.overdue_count,
                    sync_group_count = result.stats.sync_group_count,
                    elapsed_ms = result.stats.elapsed_ms,
                    committed = result.committed,
                    "排产运行结束"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "排产运行失败，未落库");
                if !dry_run {
                    self.record_run_log(ScheduleRunLog {
                        run_id: run_id.clone(),
                        started_at: now,
                        finished_at: finished_at(now, &clock),
                        status: RunStatus::Failed,
                        plans_count: 0,
                        scheduled_count: 0,
                        skipped_count: 0,
                        overdue_count: 0,
                        message: e.to_string(),
                        config_snapshot_json: config_snapshot,
                    });
                }
                Err(e)
            }
        }
    }

    /// 运行主体（同步执行，运行锁已由调用方持有）
    fn compute(
        &self,
        run_id: &str,
        now: NaiveDateTime,
        settings: &SchedulingSettings,
        clock: &RunClock,
        dry_run: bool,
    ) -> SchedulingResult<ScheduleRunResult> {
        // ==========================================
        // 步骤1: 加载待排产计划（交期升序）
        // ==========================================
        let plans = self.repos.plans.find_unscheduled_ordered_by_due_date()?;

        if plans.is_empty() {
            info!("无待排产计划");
            return Ok(ScheduleRunResult {
                run_id: run_id.to_string(),
                dry_run,
                committed: false,
                tasks: Vec::new(),
                skipped: Vec::new(),
                stats: RunStatistics::default(),
                message: "无待排产计划".to_string(),
            });
        }

        // ==========================================
        // 步骤2: 构建资源占用快照
        // ==========================================
        let devices = self.repos.resources.find_available_devices()?;
        let molds = self.repos.resources.find_available_molds()?;
        let history = self.repos.tasks.find_all_in_creation_order()?;
        let mut snapshot = OccupancySnapshot::build(&devices, &molds, &history);

        debug!(
            plans_count = plans.len(),
            devices_count = devices.len(),
            molds_count = molds.len(),
            history_tasks_count = history.len(),
            "步骤1-2: 计划与资源快照加载完成"
        );

        // ==========================================
        // 步骤3: 候选解析 + 共模同步分组
        // ==========================================
        let mut resolver = CandidateResolver::new(self.repos.resources.clone());
        let mut candidates = Vec::with_capacity(plans.len());
        for plan in &plans {
            candidates.push(resolver.resolve(&plan.material_id)?);
        }
        clock.check("候选解析")?;

        let planner = SyncGroupPlanner::new(settings.sync_window_days);
        let groups = if settings.sync_enabled {
            planner.form_groups(&plans, &candidates)
        } else {
            Vec::new()
        };
        let group_of = index_members(&groups);

        // ==========================================
        // 步骤4: 逐计划分配
        // ==========================================
        let mut tasks: Vec<ProductionTask> = Vec::with_capacity(plans.len());
        let mut skipped: Vec<SkippedPlan> = Vec::new();
        let mut handled = vec![false; plans.len()];
        let mut sync_group_count = 0usize;

        for idx in 0..plans.len() {
            clock.check("分配")?;
            if handled[idx] {
                continue;
            }

            // 同步组在锚点处整体分配；失败则成员降级为独立分配
            if let Some(&g) = group_of.get(&idx) {
                let group = &groups[g];
                if group.anchor() == idx {
                    if let Some(allocation) = planner.allocate_group(
                        group,
                        &plans,
                        &candidates,
                        &snapshot,
                        &self.allocator,
                        now,
                    ) {
                        let members = allocation.decisions.len();
                        for (member_idx, decision) in &allocation.decisions {
                            let plan = &plans[*member_idx];
                            let task = self.materialize_task(
                                plan,
                                decision,
                                Some(members),
                                Some(allocation.sync_group_id.clone()),
                                now,
                            );
                            snapshot.reserve(
                                &plan.material_id,
                                &task.device_id,
                                &task.mold_id,
                                OccupiedWindow::new(
                                    task.planned_start_time,
                                    task.planned_end_time,
                                    task.sync_group_id.clone(),
                                ),
                            )?;
                            handled[*member_idx] = true;
                            tasks.push(task);
                        }
                        sync_group_count += 1;
                        continue;
                    }
                    debug!(anchor_plan_id = %plans[idx].plan_id, "同步组无兼容组合，成员降级为独立分配");
                }
            }

            let plan = &plans[idx];
            handled[idx] = true;

            let Some(set) = candidates[idx].as_deref() else {
                warn!(plan_id = %plan.plan_id, material_id = %plan.material_id, "物料无可用设备或模具，计划跳过");
                skipped.push(skip(plan, SkipCode::NoResource, "物料无可用设备或模具候选".to_string()));
                continue;
            };

            match self.allocator.allocate(
                plan,
                set,
                &snapshot,
                now,
                settings.flexible_fallback_enabled,
            ) {
                AllocationOutcome::Allocated(decision) => {
                    let task = self.materialize_task(plan, &decision, None, None, now);
                    snapshot.reserve(
                        &plan.material_id,
                        &task.device_id,
                        &task.mold_id,
                        OccupiedWindow::new(task.planned_start_time, task.planned_end_time, None),
                    )?;
                    tasks.push(task);
                }
                AllocationOutcome::Skipped { code, message } => {
                    skipped.push(skip(plan, code, message));
                }
            }
        }

        // ==========================================
        // 步骤5: 提交
        // ==========================================
        clock.check("提交前")?;

        let overdue_count = tasks.iter().filter(|t| t.is_overdue).count();
        let stats = RunStatistics {
            plans_count: plans.len(),
            scheduled_count: tasks.len(),
            skipped_count: skipped.len(),
            overdue_count,
            sync_group_count,
            elapsed_ms: 0,
        };

        let committed = if dry_run || tasks.is_empty() {
            false
        } else {
            TaskCommitter::new(self.repos.tasks.clone()).commit(&tasks)?;
            true
        };

        let message = format!(
            "{}: 计划{}个，生成任务{}个，跳过{}个，逾期{}个",
            if dry_run { "试算完成" } else { "排产完成" },
            stats.plans_count,
            stats.scheduled_count,
            stats.skipped_count,
            stats.overdue_count
        );

        Ok(ScheduleRunResult {
            run_id: run_id.to_string(),
            dry_run,
            committed,
            tasks,
            skipped,
            stats,
            message,
        })
    }

    /// 由分配决策生成任务
    fn materialize_task(
        &self,
        plan: &ProductionPlan,
        decision: &AllocationDecision,
        sync_members: Option<usize>,
        sync_group_id: Option<String>,
        now: NaiveDateTime,
    ) -> ProductionTask {
        let (schedule_rule, schedule_reason) = self.annotator.annotate(decision, sync_members);

        debug!(
            plan_id = %plan.plan_id,
            device_id = %decision.device_id,
            mold_id = %decision.mold_id,
            start = %decision.slot.start,
            end = %decision.slot.end,
            is_overdue = decision.slot.is_overdue,
            rule = %schedule_rule,
            "计划分配完成"
        );

        ProductionTask {
            task_id: Uuid::new_v4().to_string(),
            plan_id: plan.plan_id.clone(),
            material_id: plan.material_id.clone(),
            device_id: decision.device_id.clone(),
            mold_id: decision.mold_id.clone(),
            task_quantity: plan.quantity,
            due_date: plan.due_date,
            planned_start_time: decision.slot.start,
            planned_end_time: decision.slot.end,
            is_overdue: decision.slot.is_overdue,
            status: TaskStatus::Pending,
            schedule_rule,
            schedule_reason,
            sync_group_id,
            created_at: now,
        }
    }

    /// 写运行日志（失败只告警，不影响运行结果）
    fn record_run_log(&self, entry: ScheduleRunLog) {
        if let Err(e) = self.repos.run_log.insert_run_log(&entry) {
            warn!(run_id = %entry.run_id, error = %e, "运行日志写入失败");
        }
    }
}

fn skip(plan: &ProductionPlan, code: SkipCode, message: String) -> SkippedPlan {
    SkippedPlan {
        plan_id: plan.plan_id.clone(),
        plan_no: plan.plan_no.clone(),
        material_id: plan.material_id.clone(),
        code,
        message,
    }
}

fn ceil_to_second(now: NaiveDateTime) -> NaiveDateTime {
    if now.nanosecond() == 0 {
        return now;
    }
    match now.with_nanosecond(0) {
        Some(truncated) => truncated + chrono::Duration::seconds(1),
        None => now,
    }
}

fn finished_at(started_at: NaiveDateTime, clock: &RunClock) -> NaiveDateTime {
    started_at + chrono::Duration::from_std(clock.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
}
