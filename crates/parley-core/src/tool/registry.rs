//! Registry of tools the model may call.
//!
//! Registration order is preserved so the descriptors handed to the provider
//! are stable between turns.

use parley_types::message::ToolDescriptor;

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool with the same name in place.
    ///
    /// Returns the previous descriptor if one was replaced.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Option<ToolDescriptor> {
        match self.tools.iter_mut().find(|t| t.name == descriptor.name) {
            Some(existing) => Some(std::mem::replace(existing, descriptor)),
            None => {
                self.tools.push(descriptor);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether calls to `name` need human approval. Unknown tools do not:
    /// they fail at execution time with `NoSuchTool` instead.
    pub fn requires_vetting(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.requires_vetting)
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<ToolDescriptor> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = ToolDescriptor>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        for descriptor in iter {
            registry.register(descriptor);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_keeps_order_and_replaces_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("clock", "time"));
        registry.register(ToolDescriptor::new("search", "web"));
        let old = registry.register(ToolDescriptor::new("clock", "better time").with_vetting(true));

        assert_eq!(old.unwrap().description, "time");
        let names: Vec<&str> = registry.descriptors().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["clock", "search"]);
        assert!(registry.requires_vetting("clock"));
    }

    #[test]
    fn unknown_tool_needs_no_vetting() {
        let registry: ToolRegistry = [ToolDescriptor::new("rm", "delete").with_vetting(true)]
            .into_iter()
            .collect();
        assert!(registry.requires_vetting("rm"));
        assert!(!registry.requires_vetting("nope"));
        assert!(!registry.contains("nope"));
        assert_eq!(registry.len(), 1);
    }
}
