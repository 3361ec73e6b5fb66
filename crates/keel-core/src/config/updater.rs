use crate::config::context::ConfigContext;
use crate::config::ConfigTarget;
use crate::error::CoreError;
use alloc::sync::Arc;
use spin::Mutex;

struct UpdaterState {
    last_generation: u64,
    in_flight: bool,
}

/// 逐消费者的回放游标，绑定一对（上下文，目标），按需创建、随目标存活。
///
/// # 设计背景（Why）
/// - 消费者在任意读取入口调用 [`Self::update`] 即可补齐错过的配置；调用可能
///   来自多个线程，也可能在应用回调内部重入，因此需要在不持锁执行慢速
///   回放的前提下防止级联触发。
///
/// # 契约说明（What）
/// - 锁内只维护水位线与在途标志，[`ConfigContext::apply_to`] 在锁外执行；
/// - 竞争失败的一方立即返回 `Ok(())`：成功返回只表示“没有发生错误”，
///   不保证“已完全追平”，随后的下一次 `update` 会完成追赶。
pub struct ConfigUpdater {
    context: ConfigContext,
    target: Arc<dyn ConfigTarget>,
    state: Mutex<UpdaterState>,
}

impl ConfigUpdater {
    /// 以水位线 0 创建游标，首次 `update` 会回放目前为止的全部配置。
    pub fn new(context: ConfigContext, target: Arc<dyn ConfigTarget>) -> Self {
        Self {
            context,
            target,
            state: Mutex::new(UpdaterState {
                last_generation: 0,
                in_flight: false,
            }),
        }
    }

    /// 当前（水位线，是否在途）状态快照。
    pub fn state(&self) -> (u64, bool) {
        let state = self.state.lock();
        (state.last_generation, state.in_flight)
    }

    /// 将水位线之上的配置回放到目标。
    ///
    /// # 逻辑解析（How）
    /// 1. 持锁检查在途标志：已有回放在途时直接返回 `Ok(())`，防止回调
    ///    重入造成级联；否则置位并取出水位线；
    /// 2. 锁外调用 [`ConfigContext::apply_to`]；
    /// 3. 重新持锁清除在途标志，把返回的 generation 记为新水位线。失败的
    ///    条目也被水位线越过，不会被无限重试。
    pub fn update(&self) -> Result<(), CoreError> {
        let watermark = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Ok(());
            }
            state.in_flight = true;
            state.last_generation
        };

        let (generation, result) = self.context.apply_to(watermark, self.target.as_ref());
        tracing::debug!(
            watermark,
            generation,
            updated = result.is_ok(),
            "updater advanced",
        );

        let mut state = self.state.lock();
        state.in_flight = false;
        state.last_generation = generation;
        result
    }
}

const _: fn() = || {
    fn assert_shared<T: Send + Sync>() {}

    assert_shared::<ConfigUpdater>();
};
