//! Registry configuration
//!
//! Defaults match the classic behavior: collect on every opportunity,
//! scalar pointees, and a process exit finalizer.

/// Per-registry settings consumed by [`RegistryBuilder`](crate::RegistryBuilder)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Number of collection triggers skipped between full sweeps
    pub collect_cycle: usize,
    /// Element count of every allocation in the registry (0 = scalar)
    pub declared_len: usize,
    /// Register a finalizer with the exit hook on first handle construction
    pub exit_hook: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            collect_cycle: 0,
            declared_len: 0,
            exit_hook: true,
        }
    }
}

impl GcConfig {
    /// Create config from environment variables.
    ///
    /// Read by `Registry::new` and `Registry::array`; builders start from
    /// `Default` and only see these values when passed this config.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // REFPTR_COLLECT_CYCLE: non-negative integer
        if let Some(value) = lookup("REFPTR_COLLECT_CYCLE") {
            if let Ok(cycle) = value.trim().parse::<usize>() {
                config.collect_cycle = cycle;
            }
        }

        // REFPTR_EXIT_HOOK: "0" or "false" disables the exit finalizer
        if let Some(value) = lookup("REFPTR_EXIT_HOOK") {
            config.exit_hook = !(value == "0" || value.eq_ignore_ascii_case("false"));
        }

        config
    }

    /// Config for fixed-length array allocations
    pub fn array(len: usize) -> Self {
        Self {
            declared_len: len,
            ..Self::default()
        }
    }

    pub fn with_collect_cycle(mut self, cycle: usize) -> Self {
        self.collect_cycle = cycle;
        self
    }

    pub fn without_exit_hook(mut self) -> Self {
        self.exit_hook = false;
        self
    }
}
