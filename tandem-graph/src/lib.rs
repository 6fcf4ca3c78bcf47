//! Tandem Graph - Artifact Dependencies
//!
//! Directed edges between artifacts (contracts, tasks, agents, assumptions,
//! code, designs), indexed by source and target. Edges are immutable once
//! created and queries return them in creation order.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tandem_core::{
    new_entity_id, ArtifactRef, DependencyEdge, DependencyType, DuplicateEdgePolicy,
    StorageError, TandemResult, ValidationError,
};

type EdgeKey = (ArtifactRef, ArtifactRef, DependencyType);

#[derive(Debug, Default)]
struct GraphState {
    /// Creation order; indexes below point into this list
    edges: Vec<DependencyEdge>,
    by_source: HashMap<ArtifactRef, Vec<usize>>,
    by_target: HashMap<ArtifactRef, Vec<usize>>,
    by_key: HashMap<EdgeKey, usize>,
}

impl GraphState {
    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<DependencyEdge> {
        positions
            .map(|idx| idx.iter().map(|&i| self.edges[i].clone()).collect())
            .unwrap_or_default()
    }
}

/// In-memory dependency graph shared by every coordination component.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    state: RwLock<GraphState>,
    duplicate_policy: DuplicateEdgePolicy,
}

impl DependencyGraph {
    pub fn new(duplicate_policy: DuplicateEdgePolicy) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            duplicate_policy,
        }
    }

    pub fn duplicate_policy(&self) -> DuplicateEdgePolicy {
        self.duplicate_policy
    }

    fn read(&self) -> TandemResult<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| {
            StorageError::LockPoisoned {
                resource: "dependency_graph".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> TandemResult<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| {
            StorageError::LockPoisoned {
                resource: "dependency_graph".to_string(),
            }
            .into()
        })
    }

    /// Record a directed dependency `source -> target`.
    ///
    /// An identical edge (same source, target and type) is returned as-is
    /// under `DuplicateEdgePolicy::ReturnExisting` and rejected under
    /// `DuplicateEdgePolicy::Reject`.
    pub fn create_dependency(
        &self,
        source: ArtifactRef,
        target: ArtifactRef,
        dependency_type: DependencyType,
        is_blocking: bool,
    ) -> TandemResult<DependencyEdge> {
        source.validate("source")?;
        target.validate("target")?;
        if source == target {
            tracing::warn!(artifact = %source, "Rejected self-referencing dependency");
            return Err(ValidationError::SelfLoop {
                artifact: source.to_string(),
            }
            .into());
        }

        let mut state = self.write()?;
        let key = (source, target, dependency_type);
        if let Some(&existing) = state.by_key.get(&key) {
            let edge = state.edges[existing].clone();
            return match self.duplicate_policy {
                DuplicateEdgePolicy::ReturnExisting => {
                    tracing::debug!(edge_id = %edge.edge_id, "Dependency already recorded");
                    Ok(edge)
                }
                DuplicateEdgePolicy::Reject => {
                    tracing::warn!(edge_id = %edge.edge_id, "Rejected duplicate dependency");
                    Err(ValidationError::DuplicateEdge {
                        source_ref: edge.source.to_string(),
                        target_ref: edge.target.to_string(),
                        dependency_type: dependency_type.to_string(),
                    }
                    .into())
                }
            };
        }

        let (source, target, _) = key.clone();
        let edge = DependencyEdge {
            edge_id: new_entity_id(),
            source,
            target,
            dependency_type,
            is_blocking,
            created_at: chrono::Utc::now(),
        };

        let position = state.edges.len();
        state.edges.push(edge.clone());
        state
            .by_source
            .entry(edge.source.clone())
            .or_default()
            .push(position);
        state
            .by_target
            .entry(edge.target.clone())
            .or_default()
            .push(position);
        state.by_key.insert(key, position);

        tracing::info!(
            edge_id = %edge.edge_id,
            source = %edge.source,
            target = %edge.target,
            dependency_type = %edge.dependency_type,
            is_blocking = edge.is_blocking,
            "Dependency created"
        );
        Ok(edge)
    }

    /// Edges whose source is `artifact`, i.e. things that depend on it.
    pub fn get_downstream_dependencies(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        let state = self.read()?;
        Ok(state.collect(state.by_source.get(artifact)))
    }

    /// Edges whose target is `artifact`, i.e. things it depends on.
    pub fn get_upstream_dependencies(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        let state = self.read()?;
        Ok(state.collect(state.by_target.get(artifact)))
    }

    /// Downstream edges marked blocking.
    pub fn get_blocking_dependents(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        Ok(self
            .get_downstream_dependencies(artifact)?
            .into_iter()
            .filter(|edge| edge.is_blocking)
            .collect())
    }

    /// Every edge in creation order.
    pub fn edges(&self) -> TandemResult<Vec<DependencyEdge>> {
        Ok(self.read()?.edges.clone())
    }

    pub fn len(&self) -> TandemResult<usize> {
        Ok(self.read()?.edges.len())
    }

    pub fn is_empty(&self) -> TandemResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Poison the edge lock so every later call fails with `LockPoisoned`.
    #[cfg(any(test, feature = "test-support"))]
    pub fn poison(&self) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.state.write();
                    panic!("dependency graph poisoned for test");
                })
                .join();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ArtifactType, TandemError};

    fn code(id: &str) -> ArtifactRef {
        ArtifactRef::new(ArtifactType::Code, id)
    }

    #[test]
    fn test_create_and_query_both_directions() {
        let graph = DependencyGraph::default();
        let api = ArtifactRef::contract("team-a", "UserAPI");
        let edge = graph
            .create_dependency(api.clone(), code("frontend"), DependencyType::Consumes, true)
            .unwrap();

        let down = graph.get_downstream_dependencies(&api).unwrap();
        assert_eq!(down, vec![edge.clone()]);
        let up = graph.get_upstream_dependencies(&code("frontend")).unwrap();
        assert_eq!(up, vec![edge]);
        assert!(graph.get_upstream_dependencies(&api).unwrap().is_empty());
    }

    #[test]
    fn test_self_loop_rejected() {
        let graph = DependencyGraph::default();
        let err = graph
            .create_dependency(code("a"), code("a"), DependencyType::Requires, false)
            .unwrap_err();
        assert!(matches!(
            err,
            TandemError::Validation(ValidationError::SelfLoop { .. })
        ));
        assert!(graph.is_empty().unwrap());
    }

    #[test]
    fn test_blank_ids_rejected() {
        let graph = DependencyGraph::default();
        let err = graph
            .create_dependency(code(" "), code("b"), DependencyType::Requires, false)
            .unwrap_err();
        assert!(matches!(
            err,
            TandemError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_duplicate_returns_existing_by_default() {
        let graph = DependencyGraph::default();
        let first = graph
            .create_dependency(code("a"), code("b"), DependencyType::Requires, false)
            .unwrap();
        let second = graph
            .create_dependency(code("a"), code("b"), DependencyType::Requires, true)
            .unwrap();
        assert_eq!(first.edge_id, second.edge_id);
        assert!(!second.is_blocking);
        assert_eq!(graph.len().unwrap(), 1);

        // different type is a different edge
        graph
            .create_dependency(code("a"), code("b"), DependencyType::References, false)
            .unwrap();
        assert_eq!(graph.len().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_rejected_under_reject_policy() {
        let graph = DependencyGraph::new(DuplicateEdgePolicy::Reject);
        graph
            .create_dependency(code("a"), code("b"), DependencyType::Requires, false)
            .unwrap();
        let err = graph
            .create_dependency(code("a"), code("b"), DependencyType::Requires, false)
            .unwrap_err();
        assert!(matches!(
            err,
            TandemError::Validation(ValidationError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_blocking_dependents_filter() {
        let graph = DependencyGraph::default();
        let api = ArtifactRef::contract("team-a", "UserAPI");
        graph
            .create_dependency(api.clone(), code("web"), DependencyType::Consumes, true)
            .unwrap();
        graph
            .create_dependency(api.clone(), code("docs"), DependencyType::References, false)
            .unwrap();
        let blocking = graph.get_blocking_dependents(&api).unwrap();
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].target, code("web"));
    }

    #[test]
    fn test_downstream_in_creation_order() {
        let graph = DependencyGraph::default();
        let root = code("root");
        for name in ["c", "a", "b"] {
            graph
                .create_dependency(root.clone(), code(name), DependencyType::Requires, false)
                .unwrap();
        }
        let targets: Vec<String> = graph
            .get_downstream_dependencies(&root)
            .unwrap()
            .into_iter()
            .map(|e| e.target.artifact_id)
            .collect();
        assert_eq!(targets, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_poisoned_graph_reports_storage_error() {
        let graph = DependencyGraph::default();
        assert_eq!(graph.duplicate_policy(), DuplicateEdgePolicy::ReturnExisting);
        graph.poison();

        let err = graph
            .create_dependency(code("a"), code("b"), DependencyType::Requires, false)
            .unwrap_err();
        assert!(matches!(
            err,
            TandemError::Storage(StorageError::LockPoisoned { .. })
        ));
        assert!(graph.edges().is_err());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use tandem_core::ArtifactType;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Repeated downstream queries without intervening writes are identical,
        /// and every returned edge has the queried artifact as its source.
        #[test]
        fn prop_downstream_queries_are_stable(
            pairs in prop::collection::vec((0u8..6, 0u8..6, any::<bool>()), 0..30),
            lookup in 0u8..6,
        ) {
            let graph = DependencyGraph::default();
            let node = |n: u8| ArtifactRef::new(ArtifactType::Task, format!("t{}", n));
            for (s, t, blocking) in pairs {
                if s != t {
                    graph
                        .create_dependency(node(s), node(t), DependencyType::Requires, blocking)
                        .unwrap();
                }
            }
            let first = graph.get_downstream_dependencies(&node(lookup)).unwrap();
            let second = graph.get_downstream_dependencies(&node(lookup)).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(first.iter().all(|e| e.source == node(lookup)));
            prop_assert!(graph.len().unwrap() <= 30);
        }
    }
}
