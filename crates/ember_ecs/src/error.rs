use thiserror::Error;

/// Errors surfaced by world and app operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A required resource was absent from the world.
    #[error("resource `{name}` does not exist in the world")]
    ResourceMissing { name: String },
    /// A sub-app attempted a world operation while its world was taken out
    /// (e.g. during an extract step).
    #[error("the world is not currently owned by this app")]
    WorldNotOwned,
}

/// Errors produced while preparing a schedule's dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleBuildError {
    /// The `before`/`after` graph contains a cycle; `path` lists the nodes
    /// along it in order.
    #[error("dependency cycle in schedule: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}
