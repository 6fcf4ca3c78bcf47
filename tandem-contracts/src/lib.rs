//! Tandem Contracts - Versioned Contract Registry
//!
//! Named contracts evolve through `Draft -> Active -> Deprecated`. Each
//! `(team, name)` pair is a lineage with at most one Active contract;
//! newer versions point back at the version they supersede.
//!
//! Lineage state changes (activation, evolution) are serialized by a
//! per-lineage mutex. Lock order is lineage, then contract entry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tandem_core::{
    require_field, AgentId, ArtifactRef, Contract, ContractEvolution, ContractStatus,
    DependencyType, EntityId, EntityType, NewContract, StorageError, TandemError, TandemResult,
    TeamId, ValidationError,
};
use tandem_graph::DependencyGraph;

type LineageKey = (TeamId, String);

#[derive(Debug, Default)]
struct Lineage {
    active: Option<EntityId>,
    /// Every contract ever created in this lineage, oldest first
    members: Vec<EntityId>,
}

/// Registry of contracts and their lineages.
#[derive(Debug)]
pub struct ContractRegistry {
    graph: Arc<DependencyGraph>,
    contracts: DashMap<EntityId, Contract>,
    lineages: DashMap<LineageKey, Arc<Mutex<Lineage>>>,
}

impl ContractRegistry {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            contracts: DashMap::new(),
            lineages: DashMap::new(),
        }
    }

    fn lineage(&self, team_id: &str, name: &str) -> Option<Arc<Mutex<Lineage>>> {
        self.lineages
            .get(&(team_id.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn lineage_or_create(&self, team_id: &str, name: &str) -> Arc<Mutex<Lineage>> {
        self.lineages
            .entry((team_id.to_string(), name.to_string()))
            .or_default()
            .clone()
    }

    fn lock<'a>(
        lineage: &'a Mutex<Lineage>,
        team_id: &str,
        name: &str,
    ) -> TandemResult<MutexGuard<'a, Lineage>> {
        lineage.lock().map_err(|_| {
            StorageError::LockPoisoned {
                resource: format!("contract_lineage:{}/{}", team_id, name),
            }
            .into()
        })
    }

    fn load(&self, contract_id: EntityId) -> TandemResult<Contract> {
        self.contracts
            .get(&contract_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| TandemError::not_found(EntityType::Contract, contract_id))
    }

    /// Record `contract:team/name -> agent:consumer`. An edge that already
    /// exists is fine whatever the graph's duplicate policy.
    fn link_consumer(&self, contract: &Contract, consumer: &str) -> TandemResult<()> {
        match self.graph.create_dependency(
            contract.artifact_ref(),
            ArtifactRef::agent(consumer),
            DependencyType::Consumes,
            true,
        ) {
            Ok(_) | Err(TandemError::Validation(ValidationError::DuplicateEdge { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Create a Draft contract and record its consumer edges.
    pub fn create_contract(&self, input: NewContract) -> TandemResult<Contract> {
        input.validate()?;

        let contract = Contract {
            contract_id: tandem_core::new_entity_id(),
            team_id: input.team_id,
            name: input.name,
            version: input.version,
            contract_type: input.contract_type,
            spec: input.spec,
            status: ContractStatus::Draft,
            breaking_changes: false,
            changes_from_previous: Vec::new(),
            supersedes_contract_id: None,
            owner_role: input.owner_role,
            owner_agent: input.owner_agent,
            consumers: input.consumers,
            created_at: chrono::Utc::now(),
            activated_at: None,
            activated_by: None,
            deprecated_at: None,
        };

        for consumer in &contract.consumers {
            self.link_consumer(&contract, consumer)?;
        }

        let lineage = self.lineage_or_create(&contract.team_id, &contract.name);
        {
            let mut guard = Self::lock(&lineage, &contract.team_id, &contract.name)?;
            guard.members.push(contract.contract_id);
            self.contracts.insert(contract.contract_id, contract.clone());
        }

        tracing::info!(
            contract_id = %contract.contract_id,
            team_id = %contract.team_id,
            name = %contract.name,
            version = %contract.version,
            "Contract draft created"
        );
        Ok(contract)
    }

    /// Promote a Draft to Active, deprecating the lineage's current Active
    /// contract in the same serialized step.
    pub fn activate_contract(
        &self,
        contract_id: EntityId,
        activated_by: &str,
    ) -> TandemResult<Contract> {
        require_field("activated_by", activated_by)?;

        let draft = self.load(contract_id)?;
        let lineage = self
            .lineage(&draft.team_id, &draft.name)
            .ok_or_else(|| TandemError::not_found(EntityType::Contract, contract_id))?;
        let mut guard = Self::lock(&lineage, &draft.team_id, &draft.name)?;

        // Re-read under the lineage lock; status may have moved meanwhile.
        let draft = self.load(contract_id)?;
        if draft.status != ContractStatus::Draft {
            tracing::warn!(
                contract_id = %contract_id,
                status = %draft.status,
                "Rejected activation of non-draft contract"
            );
            return Err(TandemError::invalid_transition(
                EntityType::Contract,
                contract_id,
                draft.status,
                ContractStatus::Active,
            ));
        }

        let previous = match guard.active {
            Some(active_id) => Some(self.load(active_id)?),
            None => None,
        };

        // An evolved draft must still build on the lineage's Active contract.
        if let Some(base) = draft.supersedes_contract_id {
            if guard.active != Some(base) {
                tracing::warn!(
                    contract_id = %contract_id,
                    supersedes = %base,
                    active = ?guard.active,
                    "Rejected activation of draft evolved from a superseded contract"
                );
                return Err(match &previous {
                    Some(prev) => TandemError::VersionConflict {
                        contract_id: Some(contract_id),
                        team_id: draft.team_id.clone(),
                        name: draft.name.clone(),
                        current: prev.version,
                        proposed: draft.version,
                    },
                    None => TandemError::invalid_transition(
                        EntityType::Contract,
                        contract_id,
                        draft.status,
                        ContractStatus::Active,
                    ),
                });
            }
        }

        if let Some(prev) = &previous {
            if draft.version <= prev.version {
                tracing::warn!(
                    contract_id = %contract_id,
                    active_version = %prev.version,
                    proposed = %draft.version,
                    "Rejected activation of stale contract version"
                );
                return Err(TandemError::VersionConflict {
                    contract_id: Some(contract_id),
                    team_id: draft.team_id.clone(),
                    name: draft.name.clone(),
                    current: prev.version,
                    proposed: draft.version,
                });
            }
        }

        let now = chrono::Utc::now();
        if let Some(prev) = &previous {
            if let Some(mut entry) = self.contracts.get_mut(&prev.contract_id) {
                entry.status = ContractStatus::Deprecated;
                entry.deprecated_at = Some(now);
            }
            tracing::info!(
                contract_id = %prev.contract_id,
                superseded_by = %contract_id,
                "Contract deprecated"
            );
        }

        let activated = {
            let mut entry = self
                .contracts
                .get_mut(&contract_id)
                .ok_or_else(|| TandemError::not_found(EntityType::Contract, contract_id))?;
            entry.status = ContractStatus::Active;
            entry.activated_at = Some(now);
            entry.activated_by = Some(activated_by.to_string());
            entry.value().clone()
        };
        guard.active = Some(contract_id);

        tracing::info!(
            contract_id = %contract_id,
            team_id = %activated.team_id,
            name = %activated.name,
            version = %activated.version,
            activated_by = %activated_by,
            "Contract activated"
        );
        Ok(activated)
    }

    /// Create a Draft successor of the lineage's Active contract.
    ///
    /// The draft inherits contract type, owner role and consumers; the
    /// breaking flag is taken from the caller as declared.
    pub fn evolve_contract(&self, input: ContractEvolution) -> TandemResult<Contract> {
        input.validate()?;
        let lineage_id = format!("{}/{}", input.team_id, input.name);

        let lineage = self
            .lineage(&input.team_id, &input.name)
            .ok_or_else(|| TandemError::not_found(EntityType::Contract, &lineage_id))?;
        let mut guard = Self::lock(&lineage, &input.team_id, &input.name)?;

        let active_id = guard
            .active
            .ok_or_else(|| TandemError::not_found(EntityType::Contract, &lineage_id))?;
        let active = self.load(active_id)?;

        if input.new_version <= active.version {
            tracing::warn!(
                lineage = %lineage_id,
                active_version = %active.version,
                proposed = %input.new_version,
                "Rejected contract evolution with stale version"
            );
            return Err(TandemError::VersionConflict {
                contract_id: Some(active_id),
                team_id: input.team_id,
                name: input.name,
                current: active.version,
                proposed: input.new_version,
            });
        }

        let draft = Contract {
            contract_id: tandem_core::new_entity_id(),
            team_id: input.team_id,
            name: input.name,
            version: input.new_version,
            contract_type: active.contract_type,
            spec: input.new_spec,
            status: ContractStatus::Draft,
            breaking_changes: input.breaking_changes,
            changes_from_previous: input.changes_from_previous,
            supersedes_contract_id: Some(active_id),
            owner_role: active.owner_role.clone(),
            owner_agent: input.owner_agent,
            consumers: active.consumers.clone(),
            created_at: chrono::Utc::now(),
            activated_at: None,
            activated_by: None,
            deprecated_at: None,
        };

        guard.members.push(draft.contract_id);
        self.contracts.insert(draft.contract_id, draft.clone());

        tracing::info!(
            contract_id = %draft.contract_id,
            supersedes = %active_id,
            version = %draft.version,
            breaking = draft.breaking_changes,
            "Contract evolved"
        );
        Ok(draft)
    }

    /// Add a consumer to a contract. Idempotent.
    pub fn register_consumer(
        &self,
        contract_id: EntityId,
        consumer_id: &str,
    ) -> TandemResult<Contract> {
        require_field("consumer_id", consumer_id)?;

        let current = self.load(contract_id)?;
        if !current.consumers.contains(consumer_id) {
            // Edge first: a failed graph write leaves the contract untouched.
            self.link_consumer(&current, consumer_id)?;
        }

        let (contract, inserted) = {
            let mut entry = self
                .contracts
                .get_mut(&contract_id)
                .ok_or_else(|| TandemError::not_found(EntityType::Contract, contract_id))?;
            let inserted = entry.consumers.insert(consumer_id.to_string());
            (entry.value().clone(), inserted)
        };

        if inserted {
            tracing::info!(
                contract_id = %contract_id,
                consumer = %consumer_id,
                "Consumer registered"
            );
        } else {
            tracing::debug!(
                contract_id = %contract_id,
                consumer = %consumer_id,
                "Consumer already registered"
            );
        }
        Ok(contract)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get_contract(&self, contract_id: EntityId) -> TandemResult<Contract> {
        self.load(contract_id)
    }

    /// The Active contract of a lineage, if any.
    pub fn get_active_contract(&self, team_id: &str, name: &str) -> TandemResult<Option<Contract>> {
        let Some(lineage) = self.lineage(team_id, name) else {
            return Ok(None);
        };
        let active = Self::lock(&lineage, team_id, name)?.active;
        match active {
            Some(id) => self.load(id).map(Some),
            None => Ok(None),
        }
    }

    /// Every contract of a team, ordered by name then version.
    pub fn list_contracts(&self, team_id: &str) -> Vec<Contract> {
        let mut contracts: Vec<Contract> = self
            .contracts
            .iter()
            .filter(|c| c.team_id == team_id)
            .map(|c| c.value().clone())
            .collect();
        contracts.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then(a.version.cmp(&b.version))
                .then(a.contract_id.cmp(&b.contract_id))
        });
        contracts
    }

    /// Lineage history, newest first.
    ///
    /// Walks the supersedes chain from the highest version; contracts not
    /// on that chain (independent drafts) follow, newest version first.
    pub fn get_version_history(&self, team_id: &str, name: &str) -> TandemResult<Vec<Contract>> {
        let Some(lineage) = self.lineage(team_id, name) else {
            return Ok(Vec::new());
        };
        let members = Self::lock(&lineage, team_id, name)?.members.clone();

        let mut remaining: Vec<Contract> = members
            .into_iter()
            .filter_map(|id| self.contracts.get(&id).map(|c| c.value().clone()))
            .collect();
        remaining.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then(b.contract_id.cmp(&a.contract_id))
        });

        let mut history = Vec::with_capacity(remaining.len());
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut cursor = remaining.first().map(|c| c.contract_id);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            let Some(contract) = remaining.iter().find(|c| c.contract_id == id).cloned() else {
                break;
            };
            cursor = contract.supersedes_contract_id;
            history.push(contract);
        }
        history.extend(remaining.into_iter().filter(|c| !seen.contains(&c.contract_id)));
        Ok(history)
    }

    /// Consumers of a contract.
    pub fn consumers(&self, contract_id: EntityId) -> TandemResult<Vec<AgentId>> {
        Ok(self.load(contract_id)?.consumers.into_iter().collect())
    }

    /// Every contract across teams, for snapshots.
    pub fn all_contracts(&self) -> Vec<Contract> {
        let mut contracts: Vec<Contract> = self.contracts.iter().map(|c| c.value().clone()).collect();
        contracts.sort_by_key(|c| c.contract_id);
        contracts
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tandem_core::{ContractType, ContractVersion};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Whatever order drafts are activated in, a lineage never has more
        /// than one Active contract and the Active one has the highest
        /// version activated so far.
        #[test]
        fn prop_at_most_one_active(order in prop::collection::vec(1u32..10, 1..12)) {
            let registry = ContractRegistry::new(Arc::new(DependencyGraph::default()));
            let mut best: Option<u32> = None;
            for major in order {
                let draft = registry.create_contract(NewContract {
                    team_id: "t".to_string(),
                    name: "Api".to_string(),
                    version: ContractVersion::new(major, 0, 0),
                    contract_type: ContractType::Event,
                    spec: json!({}),
                    owner_role: "backend".to_string(),
                    owner_agent: "a".to_string(),
                    consumers: Default::default(),
                }).unwrap();
                let result = registry.activate_contract(draft.contract_id, "lead");
                match best {
                    Some(b) if major <= b => prop_assert!(result.is_err()),
                    _ => {
                        prop_assert!(result.is_ok());
                        best = Some(major);
                    }
                }
                let active = registry
                    .list_contracts("t")
                    .into_iter()
                    .filter(|c| c.is_active())
                    .count();
                prop_assert_eq!(active, 1);
            }
        }
    }
}
