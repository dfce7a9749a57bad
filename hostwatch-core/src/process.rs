//! Process attribution for resource alerts.

use std::fmt::Debug;

/// Resource whose consumers can be attributed to processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Cpu,
    Memory,
}

impl Resource {
    /// Resource measured by a plugin, if its alerts should link processes.
    pub fn for_plugin(plugin: &str) -> Option<Resource> {
        match plugin {
            "cpu" | "percpu" | "load" => Some(Resource::Cpu),
            "mem" | "memswap" => Some(Resource::Memory),
            _ => None,
        }
    }
}

/// Lookup of the processes currently consuming a resource.
///
/// Implemented outside the core (e.g. by a process-list collector). Called
/// during threshold evaluation, so it should answer from an existing
/// process snapshot rather than scan the system.
pub trait ProcessLookup: Send + Sync + Debug {
    /// Ids of the top consumers of `resource`, most significant first.
    fn top_processes(&self, resource: Resource) -> Vec<u32>;
}

/// Lookup that never attributes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProcessLookup;

impl ProcessLookup for NoProcessLookup {
    fn top_processes(&self, _resource: Resource) -> Vec<u32> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_and_memory_plugins_map_to_resources() {
        assert_eq!(Resource::for_plugin("cpu"), Some(Resource::Cpu));
        assert_eq!(Resource::for_plugin("load"), Some(Resource::Cpu));
        assert_eq!(Resource::for_plugin("mem"), Some(Resource::Memory));
        assert_eq!(Resource::for_plugin("memswap"), Some(Resource::Memory));
        assert_eq!(Resource::for_plugin("fs"), None);
    }
}
