use crate::config::aggregate::ConfigSet;
use crate::config::{ConfigSelector, ConfigSpec};
use crate::schema::{SchemaRegistry, SpecKind, TypedSpec, UnstructuredSpec};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// 存储中的一条已应用配置，查询结果以此形态快照返回。
#[derive(Clone)]
pub struct AppliedConfig {
    /// 存储时分配的序号。
    pub generation: u64,
    /// 应用时的诊断描述链。
    pub description: String,
    /// 配置本体；通用回退形态在每次读取时都已对照注册表重新求值。
    pub config: Arc<dyn ConfigSpec>,
}

struct StoredEntry {
    generation: u64,
    description: String,
    config: Arc<dyn ConfigSpec>,
}

struct StoreState {
    generation: u64,
    entries: Vec<StoredEntry>,
    kinds: BTreeMap<String, Vec<usize>>,
    sets: BTreeMap<String, ConfigSet>,
}

/// 追加式、以 generation 编号的配置日志，归属且仅归属一个上下文。
///
/// # 设计背景（Why）
/// - 回放协议要求“水位线之上的条目恰好重放一次”，因此写入顺序即回放顺序，
///   generation 严格递增且在 reset 后也不复用。
///
/// # 并发契约（What）
/// - 全部操作在互斥锁内完成；查询同样取互斥锁而非共享读，因为读取会就地
///   重新求值通用回退条目；
/// - 查询总是连同当前 generation 一起返回，即使没有任何匹配，调用方的
///   水位线也能越过“什么都没发生”的区间。
pub struct ConfigStore {
    state: Mutex<StoreState>,
}

impl ConfigStore {
    /// 构造空存储。
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                generation: 0,
                entries: Vec::new(),
                kinds: BTreeMap::new(),
                sets: BTreeMap::new(),
            }),
        }
    }

    /// 当前 generation。
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// 记录一条配置，返回分配的 generation。
    ///
    /// 条目同时进入主日志与按无版本 kind 建立的桶索引，同一 kind 的所有
    /// 版本共享一个桶。
    pub fn apply(&self, config: Arc<dyn ConfigSpec>, description: &str) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        let bucket = crate::schema::versionless(config.kind()).to_string();
        let index = state.entries.len();
        tracing::debug!(
            generation,
            kind = config.kind(),
            description,
            "configuration applied to store",
        );
        state.entries.push(StoredEntry {
            generation,
            description: description.to_string(),
            config,
        });
        state.kinds.entry(bucket).or_default().push(index);
        generation
    }

    /// 清空日志与桶索引，返回清空时刻的 generation。
    ///
    /// 计数器保持不变，reset 之前取得的水位线不会被 reset 之后的新内容
    /// 误判为已满足；具名配置集不受影响。
    pub fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        state.entries.clear();
        state.kinds.clear();
        tracing::debug!(generation = state.generation, "configuration store reset");
        state.generation
    }

    /// 按 generation 下限与可选谓词查询全部条目。
    pub fn configs_for_selector(
        &self,
        registry: &SchemaRegistry,
        floor: u64,
        selector: Option<&dyn ConfigSelector>,
    ) -> (u64, Vec<AppliedConfig>) {
        let mut state = self.state.lock();
        let candidates: Vec<usize> = (0..state.entries.len()).collect();
        let matches = snapshot(&mut state, registry, candidates, floor, None, None, selector);
        (state.generation, matches)
    }

    /// 按 kind 查询。
    ///
    /// 请求 `K` 时返回该 kind 的所有版本；请求 `K/v2` 时在桶内再按版本
    /// 相等筛选（省略版本的条目视为 `v1`）。
    pub fn configs_for_kind(
        &self,
        registry: &SchemaRegistry,
        kind: &str,
        floor: u64,
        selector: Option<&dyn ConfigSelector>,
    ) -> (u64, Vec<AppliedConfig>) {
        let requested = SpecKind::parse(kind);
        let mut state = self.state.lock();
        let candidates = state
            .kinds
            .get(requested.base())
            .cloned()
            .unwrap_or_default();
        let version = requested.explicit_version().is_some().then_some(&requested);
        let matches = snapshot(&mut state, registry, candidates, floor, version, None, selector);
        (state.generation, matches)
    }

    /// 按逻辑名称查询。
    pub fn configs_for_name(
        &self,
        registry: &SchemaRegistry,
        name: &str,
        floor: u64,
        selector: Option<&dyn ConfigSelector>,
    ) -> (u64, Vec<AppliedConfig>) {
        let mut state = self.state.lock();
        let candidates: Vec<usize> = (0..state.entries.len()).collect();
        let matches = snapshot(
            &mut state,
            registry,
            candidates,
            floor,
            None,
            Some(name),
            selector,
        );
        (state.generation, matches)
    }

    /// 登记一个具名配置集，重名以后到者为准。
    pub fn add_set(&self, name: &str, set: ConfigSet) {
        self.state.lock().sets.insert(name.to_string(), set);
    }

    /// 取出具名配置集的快照。
    pub fn set(&self, name: &str) -> Option<ConfigSet> {
        self.state.lock().sets.get(name).cloned()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 在锁内遍历候选条目：先就地重新求值通用回退形态，再依次套用
/// generation 下限、版本相等、名称与谓词筛选。
fn snapshot(
    state: &mut StoreState,
    registry: &SchemaRegistry,
    candidates: Vec<usize>,
    floor: u64,
    version: Option<&SpecKind>,
    name: Option<&str>,
    selector: Option<&dyn ConfigSelector>,
) -> Vec<AppliedConfig> {
    let mut matches = Vec::new();
    for index in candidates {
        if state.entries[index].generation <= floor {
            continue;
        }
        reevaluate(&mut state.entries[index], registry);
        let entry = &state.entries[index];
        if let Some(requested) = version {
            let actual = SpecKind::parse(entry.config.kind());
            if actual.version() != requested.version() {
                continue;
            }
        }
        if let Some(name) = name {
            if entry.config.name() != Some(name) {
                continue;
            }
        }
        if let Some(selector) = selector {
            if !selector.select(entry.config.as_ref()) {
                continue;
            }
        }
        matches.push(AppliedConfig {
            generation: entry.generation,
            description: entry.description.clone(),
            config: entry.config.clone(),
        });
    }
    matches
}

/// 通用回退条目的就地读修复：kind 一旦注册，后续读取直接得到具体类型。
/// 解码失败时保留通用形态，错误留给显式的 validate 路径上报。
fn reevaluate(entry: &mut StoredEntry, registry: &SchemaRegistry) {
    let Some(generic) = entry.config.as_any().downcast_ref::<UnstructuredSpec>() else {
        return;
    };
    match generic.evaluate(registry) {
        Ok(Some(concrete)) => {
            tracing::debug!(
                generation = entry.generation,
                kind = concrete.kind(),
                "generic configuration entry re-evaluated",
            );
            entry.config = Arc::from(concrete);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::debug!(
                generation = entry.generation,
                error = %err,
                "generic configuration entry kept, decode failed",
            );
        }
    }
}

const _: fn() = || {
    fn assert_shared<T: Send + Sync>() {}

    assert_shared::<ConfigStore>();
};
