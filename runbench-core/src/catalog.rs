use std::collections::HashMap;

/// One invocable benchmark script known to the system.
///
/// `program` is the binary or interpreter; `args` are the fixed leading
/// arguments (typically the script path). Per-run flags are appended by the
/// coordinator from the submission's variant and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub id: String,
    pub program: String,
    pub args: Vec<String>,
}

impl ScriptEntry {
    pub fn new(
        id: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Seam between admission and whatever enumerates scripts on disk. The
/// filesystem scan itself lives outside the orchestration core; the core only
/// needs resolution for validation and command construction.
pub trait ScriptCatalog: Send + Sync {
    fn resolve(&self, id: &str) -> Option<&ScriptEntry>;

    fn ids(&self) -> Vec<&str>;

    fn contains(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }
}

/// Catalog backed by a fixed table, built once from configuration.
#[derive(Debug, Default)]
pub struct StaticScriptCatalog {
    entries: HashMap<String, ScriptEntry>,
}

impl StaticScriptCatalog {
    pub fn new(entries: impl IntoIterator<Item = ScriptEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect(),
        }
    }
}

impl ScriptCatalog for StaticScriptCatalog {
    fn resolve(&self, id: &str) -> Option<&ScriptEntry> {
        self.entries.get(id)
    }

    fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
