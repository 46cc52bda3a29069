//! Thread-safe template rendering with per-name instance pools.
//!
//! A [`TemplatePool`] keeps one [`InstancePool`] per template name. The
//! name-to-pool map is read under a shared lock and only written, with a
//! re-check, when a name is seen for the first time, so racing first
//! renders always end up sharing one pool. Each instance pool compiles its
//! template at most once per registry generation and lends out clones of
//! that compiled prototype, one caller at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::compile::{compile, CompiledTemplate};
use crate::config::PoolConfig;
use crate::error::{TemplateError, TemplateResult};
use crate::registry::{validate_template_name, TemplateSources};

/// A pooled template instance.
///
/// `compiled` is `None` when the body was missing or failed to compile;
/// that absent marker is pooled and released like any other instance.
#[derive(Clone)]
struct Instance {
    generation: u64,
    compiled: Option<CompiledTemplate>,
}

type Factory = Box<dyn Fn() -> Instance + Send + Sync>;

#[derive(Default)]
struct Counters {
    compilations: AtomicU64,
    instances_created: AtomicU64,
    borrows: AtomicU64,
    reuses: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time counters for one template's pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Times the template body was compiled.
    pub compilations: u64,
    /// Instances handed out fresh from the compiled prototype.
    pub instances_created: u64,
    pub borrows: u64,
    /// Borrows served from the idle list.
    pub reuses: u64,
    /// Idle instances dropped because the registry changed underneath them.
    pub discarded: u64,
    /// Instances currently idle.
    pub idle: usize,
}

/// Free-list of instances for a single template name.
struct InstancePool {
    max_idle: usize,
    idle: Mutex<Vec<Instance>>,
    prototype: Mutex<Option<Instance>>,
    factory: Factory,
    counters: Counters,
}

impl InstancePool {
    fn new(max_idle: usize, factory: Factory) -> Self {
        Self {
            max_idle,
            idle: Mutex::new(Vec::new()),
            prototype: Mutex::new(None),
            factory,
            counters: Counters::default(),
        }
    }

    /// Borrow an instance compiled at `generation` or later.
    fn borrow(&self, generation: u64) -> Lease<'_> {
        self.counters.borrows.fetch_add(1, Ordering::Relaxed);

        let instance = match self.take_idle(generation) {
            Some(instance) => {
                self.counters.reuses.fetch_add(1, Ordering::Relaxed);
                instance
            }
            None => self.instantiate(generation),
        };

        Lease {
            pool: self,
            instance: Some(instance),
        }
    }

    fn take_idle(&self, generation: u64) -> Option<Instance> {
        let mut idle = self.idle.lock();
        while let Some(instance) = idle.pop() {
            if instance.generation >= generation {
                return Some(instance);
            }
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Clone the prototype, compiling it first if it is missing or stale.
    ///
    /// The prototype lock is held across the compile so that concurrent
    /// first borrows wait for one compilation instead of each running their
    /// own.
    fn instantiate(&self, generation: u64) -> Instance {
        let mut prototype = self.prototype.lock();
        self.counters.instances_created.fetch_add(1, Ordering::Relaxed);

        match prototype.as_ref() {
            Some(current) if current.generation >= generation => current.clone(),
            _ => {
                let built = (self.factory)();
                self.counters.compilations.fetch_add(1, Ordering::Relaxed);
                *prototype = Some(built.clone());
                built
            }
        }
    }

    fn release(&self, instance: Instance) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(instance);
        }
    }

    /// Drop every idle instance and the prototype. Returns how many idle
    /// instances were dropped and whether the prototype was a compiled
    /// template.
    fn reclaim(&self) -> (usize, bool) {
        let dropped = {
            let mut idle = self.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        let compiled = self
            .prototype
            .lock()
            .take()
            .is_some_and(|prototype| prototype.compiled.is_some());
        (dropped, compiled)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            compilations: self.counters.compilations.load(Ordering::Relaxed),
            instances_created: self.counters.instances_created.load(Ordering::Relaxed),
            borrows: self.counters.borrows.load(Ordering::Relaxed),
            reuses: self.counters.reuses.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
        }
    }
}

/// An instance on loan from an [`InstancePool`]; returned to it on drop.
struct Lease<'a> {
    pool: &'a InstancePool,
    instance: Option<Instance>,
}

impl Lease<'_> {
    fn template(&self) -> Option<&CompiledTemplate> {
        self.instance.as_ref().and_then(|i| i.compiled.as_ref())
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.pool.release(instance);
        }
    }
}

/// Renders registered templates by name, reusing compiled instances.
///
/// Owned and injected explicitly; build one per registry and share it
/// (e.g. behind an `Arc`) between threads.
pub struct TemplatePool {
    sources: Arc<TemplateSources>,
    config: PoolConfig,
    pools: RwLock<HashMap<String, Arc<InstancePool>>>,
}

impl TemplatePool {
    /// Create a pool over `sources` with the default configuration.
    pub fn new(sources: Arc<TemplateSources>) -> Self {
        Self::with_config(sources, PoolConfig::default())
    }

    pub fn with_config(sources: Arc<TemplateSources>, config: PoolConfig) -> Self {
        Self {
            sources,
            config,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn sources(&self) -> &Arc<TemplateSources> {
        &self.sources
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Render the template `name` against `data`.
    ///
    /// Interpolated values are HTML-escaped. On any error no output is
    /// produced. The borrowed instance goes back to its pool on every path.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> TemplateResult<String> {
        if let Err(err) = validate_template_name(name) {
            warn!(name_len = name.len(), "Rejected invalid template name");
            return Err(err);
        }

        let pool = self.instance_pool(name);
        let lease = pool.borrow(self.sources.generation());

        let Some(template) = lease.template() else {
            return Err(TemplateError::TemplateNotFound(name.to_string()));
        };

        template
            .render(data)
            .map_err(|source| TemplateError::RenderExecution {
                name: name.to_string(),
                source,
            })
    }

    /// Counters for `name`, if it has been rendered at least once.
    pub fn stats(&self, name: &str) -> Option<PoolStats> {
        self.pools.read().get(name).map(|pool| pool.stats())
    }

    /// Number of per-name pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Drop all idle instances and compiled prototypes; returns how many
    /// idle instances were dropped.
    ///
    /// Pools of compiled templates are kept and recompile on their next
    /// render. Pools that only held the absent marker (names that were never
    /// registered or failed to compile) are removed from the map.
    pub fn reclaim_idle(&self) -> usize {
        let pools: Vec<(String, Arc<InstancePool>)> = self
            .pools
            .read()
            .iter()
            .map(|(name, pool)| (name.clone(), Arc::clone(pool)))
            .collect();

        let mut dropped = 0;
        let mut absent = Vec::new();
        for (name, pool) in pools {
            let (count, compiled) = pool.reclaim();
            dropped += count;
            if !compiled {
                absent.push((name, pool));
            }
        }

        let removed = absent.len();
        if removed > 0 {
            let mut map = self.pools.write();
            for (name, pool) in absent {
                // Only remove the entry that was reclaimed, not a replacement.
                if map.get(&name).is_some_and(|current| Arc::ptr_eq(current, &pool)) {
                    map.remove(&name);
                }
            }
        }

        debug!(dropped, removed, "Reclaimed idle template instances");
        dropped
    }

    fn instance_pool(&self, name: &str) -> Arc<InstancePool> {
        let existing = self.pools.read().get(name).cloned();
        if let Some(pool) = existing {
            return pool;
        }

        let mut pools = self.pools.write();
        // Another caller may have installed the pool between the locks.
        let pool = pools.entry(name.to_string()).or_insert_with(|| {
            debug!(template = name, "Creating instance pool");
            Arc::new(InstancePool::new(
                self.config.max_idle_per_template,
                self.factory(name),
            ))
        });
        Arc::clone(pool)
    }

    fn factory(&self, name: &str) -> Factory {
        let sources = Arc::clone(&self.sources);
        let config = self.config.clone();
        let name = name.to_string();

        Box::new(move || {
            let (generation, source) = sources.resolve(&name);
            let compiled = match source {
                None => {
                    debug!(template = %name, generation, "No registered bundle provides template");
                    None
                }
                Some(source) => match compile(&source, &sources, &config) {
                    Ok(compiled) => {
                        debug!(template = %name, namespace = %source.namespace, generation, "Compiled template");
                        Some(compiled)
                    }
                    Err(err) => {
                        warn!(
                            template = %name,
                            namespace = %source.namespace,
                            error = %err,
                            "Template failed to compile"
                        );
                        None
                    }
                },
            };
            Instance {
                generation,
                compiled,
            }
        })
    }
}

impl std::fmt::Debug for TemplatePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplatePool")
            .field("sources", &self.sources)
            .field("config", &self.config)
            .field("pools", &self.pool_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(max_idle: usize, builds: Arc<AtomicUsize>) -> InstancePool {
        InstancePool::new(
            max_idle,
            Box::new(move || {
                builds.fetch_add(1, Ordering::SeqCst);
                Instance {
                    generation: 1,
                    compiled: None,
                }
            }),
        )
    }

    #[test]
    fn test_absent_instance_is_returned_to_pool() {
        let builds = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(4, Arc::clone(&builds));

        {
            let lease = pool.borrow(1);
            assert!(lease.template().is_none());
        }
        assert_eq!(pool.stats().idle, 1);

        let _lease = pool.borrow(1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn test_idle_list_is_bounded() {
        let builds = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(1, Arc::clone(&builds));

        let first = pool.borrow(1);
        let second = pool.borrow(1);
        drop(first);
        drop(second);

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.instances_created, 2);
        assert_eq!(stats.compilations, 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_instances_are_discarded() {
        let builds = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(4, Arc::clone(&builds));

        drop(pool.borrow(1));
        // The factory only ever reports generation 1, so asking for 2
        // discards the idle instance and rebuilds.
        drop(pool.borrow(2));

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.compilations, 2);
    }

    #[test]
    fn test_reclaim_drops_idle_and_prototype() {
        let builds = Arc::new(AtomicUsize::new(0));
        let pool = counting_pool(4, Arc::clone(&builds));

        drop(pool.borrow(1));
        assert_eq!(pool.reclaim(), (1, false));
        assert_eq!(pool.stats().idle, 0);

        drop(pool.borrow(1));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_render_rejects_invalid_names_before_lookup() {
        let pool = TemplatePool::new(Arc::new(TemplateSources::new()));
        let result = pool.render("../../../etc/passwd", ());
        assert!(matches!(result, Err(TemplateError::InvalidTemplateName { .. })));
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let pool = TemplatePool::new(Arc::new(TemplateSources::new()));
        let result = pool.render("nonexistent_template", ());
        assert!(matches!(result, Err(TemplateError::TemplateNotFound(name)) if name == "nonexistent_template"));
        assert_eq!(pool.stats("nonexistent_template").unwrap().idle, 1);
    }

    #[test]
    fn test_reclaim_removes_pools_of_missing_templates() {
        let sources = Arc::new(TemplateSources::new());
        sources
            .register("test", crate::registry::TemplateBundle::new().with_template("kept", "ok"))
            .unwrap();
        let pool = TemplatePool::new(sources);

        assert!(pool.render("kept", ()).is_ok());
        for name in ["missing_a", "missing_b"] {
            assert!(matches!(pool.render(name, ()), Err(TemplateError::TemplateNotFound(_))));
        }
        assert_eq!(pool.pool_count(), 3);

        assert_eq!(pool.reclaim_idle(), 3);
        assert_eq!(pool.pool_count(), 1);
        assert!(pool.stats("kept").is_some());
        assert!(pool.stats("missing_a").is_none());
    }
}
