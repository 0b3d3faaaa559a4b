//! Task validators.

use std::sync::Arc;
use async_trait::async_trait;
use blockmind_config::{TaskConfig, TaskKind};
use blockmind_core::validator::TaskValidator;
use blockmind_core::world::World;
use tracing::{debug, warn};

/// Succeeds once the agent holds `count` of `target`.
pub struct InventoryTargetValidator {
    world: Arc<dyn World>,
    target: String,
    count: u32,
}

impl InventoryTargetValidator {
    pub fn new(world: Arc<dyn World>, target: impl Into<String>, count: u32) -> Self {
        Self {
            world,
            target: target.into(),
            count,
        }
    }

    /// The validator for `task`, if its kind is checked by inventory.
    pub fn from_task(task: &TaskConfig, world: Arc<dyn World>) -> Option<Self> {
        match (task.kind, &task.target) {
            (TaskKind::Harvest | TaskKind::Techtree, Some(target)) => {
                Some(Self::new(world, target.clone(), task.number_of_target))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl TaskValidator for InventoryTargetValidator {
    async fn validate(&self) -> bool {
        match self.world.inventory().await {
            Ok(inventory) => {
                let have = inventory.get(&self.target).copied().unwrap_or(0);
                debug!(target = %self.target, have, need = self.count, "Validating task");
                have >= self.count
            }
            Err(e) => {
                warn!(error = %e, "Could not read inventory for validation");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use blockmind_world::SimWorld;

    fn task(kind: TaskKind, target: Option<&str>) -> TaskConfig {
        TaskConfig {
            kind,
            target: target.map(String::from),
            number_of_target: 2,
            initial_inventory: HashMap::new(),
            agent_names: vec!["andy".into()],
            blocked_actions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_once_target_is_held() {
        let world = Arc::new(SimWorld::new("andy").with_echo(false));
        let validator =
            InventoryTargetValidator::from_task(&task(TaskKind::Harvest, Some("stick")), world.clone()).unwrap();

        assert!(!validator.validate().await);
        world.chat("/give andy stick 1").await.unwrap();
        assert!(!validator.validate().await);
        world.chat("/give andy stick 1").await.unwrap();
        assert!(validator.validate().await);
    }

    #[test]
    fn construction_tasks_have_no_inventory_validator() {
        let world: Arc<dyn World> = Arc::new(SimWorld::new("andy").with_echo(false));
        assert!(InventoryTargetValidator::from_task(&task(TaskKind::Construction, Some("house")), world).is_none());
    }
}
