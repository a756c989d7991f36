//! Per-context tool bookkeeping and the derived aggregate catalog.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tabmcp_bridge::ToolDescriptor;

/// Metadata accompanying a context's tool registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMeta {
    pub origin_url: String,
    pub display_title: String,
    /// Whether the context runs the real host capability or the no-op
    /// stand-in.
    pub is_polyfilled: bool,
}

/// One browser tab or background execution unit capable of registering
/// tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub context_id: String,
    pub origin_url: String,
    pub display_title: String,
    pub tools: Vec<ToolDescriptor>,
    pub is_polyfilled: bool,
}

/// A catalog entry tagged with its owning context.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTool {
    pub context_id: String,
    pub descriptor: ToolDescriptor,
}

/// Maps each context to its last-known tool set.
///
/// A context id maps to at most one record. Tool names are unique within a
/// context but may collide across contexts; the aggregate keeps all of
/// them and [`ContextRegistry::resolve_owner`] answers first-match-wins by
/// context insertion order.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: IndexMap<String, ContextRecord>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: replaces the full tool list for the context. Registration
    /// is always a full replace, never an incremental patch.
    pub fn update_context(&mut self, context_id: &str, meta: ContextMeta, tools: Vec<ToolDescriptor>) {
        match self.contexts.get_mut(context_id) {
            Some(record) => {
                record.origin_url = meta.origin_url;
                record.display_title = meta.display_title;
                record.is_polyfilled = meta.is_polyfilled;
                record.tools = tools;
            }
            None => {
                self.contexts.insert(
                    context_id.to_string(),
                    ContextRecord {
                        context_id: context_id.to_string(),
                        origin_url: meta.origin_url,
                        display_title: meta.display_title,
                        tools,
                        is_polyfilled: meta.is_polyfilled,
                    },
                );
            }
        }
    }

    /// Empties a navigating context's tool list so stale tools don't linger
    /// through the load. The record itself survives.
    pub fn clear_context_tools(&mut self, context_id: &str) {
        if let Some(record) = self.contexts.get_mut(context_id) {
            record.tools.clear();
        }
    }

    /// Removes a permanently destroyed context.
    pub fn remove_context(&mut self, context_id: &str) {
        self.contexts.shift_remove(context_id);
    }

    pub fn contains(&self, context_id: &str) -> bool {
        self.contexts.contains_key(context_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ContextRecord> {
        self.contexts.values()
    }

    /// Deterministic aggregate: context insertion order, then registration
    /// order within each context.
    pub fn aggregate(&self) -> Vec<AggregatedTool> {
        self.contexts
            .values()
            .flat_map(|record| {
                record.tools.iter().map(|descriptor| AggregatedTool {
                    context_id: record.context_id.clone(),
                    descriptor: descriptor.clone(),
                })
            })
            .collect()
    }

    /// Flat descriptor list in aggregate order, as advertised to the
    /// bridge.
    pub fn flat_tools(&self) -> Vec<ToolDescriptor> {
        self.aggregate().into_iter().map(|t| t.descriptor).collect()
    }

    /// First context (by insertion order) whose tool list contains `name`.
    pub fn resolve_owner(&self, name: &str) -> Option<&str> {
        self.contexts
            .values()
            .find(|record| record.tools.iter().any(|t| t.name == name))
            .map(|record| record.context_id.as_str())
    }

    /// Drops records for contexts not in `live`. Advisory correction after
    /// a restart; authoritative state still flows from the contexts.
    pub fn reconcile(&mut self, live: &[String]) {
        self.contexts.retain(|id, _| live.iter().any(|l| l == id));
    }

    pub fn restore(&mut self, records: Vec<ContextRecord>) {
        self.contexts = records
            .into_iter()
            .map(|r| (r.context_id.clone(), r))
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "", json!({"type": "object"}))
    }

    fn meta(url: &str) -> ContextMeta {
        ContextMeta {
            origin_url: url.to_string(),
            display_title: url.to_string(),
            is_polyfilled: false,
        }
    }

    #[test]
    fn test_update_is_full_replace() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("a")]);
        registry.update_context("tab1", meta("https://a"), vec![tool("b"), tool("c")]);

        let names: Vec<_> = registry.flat_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_aggregate_order_is_stable() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("a1"), tool("a2")]);
        registry.update_context("tab2", meta("https://b"), vec![tool("b1")]);
        // Re-registering tab1 keeps its insertion position.
        registry.update_context("tab1", meta("https://a"), vec![tool("a1"), tool("a3")]);

        let names: Vec<_> = registry.flat_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a1", "a3", "b1"]);
    }

    #[test]
    fn test_clear_keeps_record() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("a")]);
        registry.clear_context_tools("tab1");

        assert!(registry.contains("tab1"));
        assert!(registry.flat_tools().is_empty());
    }

    #[test]
    fn test_remove_deletes_record() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("a")]);
        registry.remove_context("tab1");
        assert!(!registry.contains("tab1"));
    }

    #[test]
    fn test_collision_resolves_to_earliest_context() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("shared")]);
        registry.update_context("tab2", meta("https://b"), vec![tool("shared")]);

        assert_eq!(registry.resolve_owner("shared"), Some("tab1"));

        // Earliest owner releasing the name hands it to the next context.
        registry.clear_context_tools("tab1");
        assert_eq!(registry.resolve_owner("shared"), Some("tab2"));
    }

    #[test]
    fn test_reconcile_drops_dead_contexts() {
        let mut registry = ContextRegistry::new();
        registry.update_context("tab1", meta("https://a"), vec![tool("a")]);
        registry.update_context("tab2", meta("https://b"), vec![tool("b")]);

        registry.reconcile(&["tab2".to_string()]);
        assert!(!registry.contains("tab1"));
        assert!(registry.contains("tab2"));
    }
}
